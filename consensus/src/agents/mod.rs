//! Agent adapters for analysis backends
//!
//! Every backend is wrapped in an [`AgentAdapter`] that normalizes its
//! output into an [`AgentResult`]. The set of agents is closed: the manifest
//! is the [`AgentId`] enum, configured into chains at startup, never
//! dispatched by runtime strings.

pub mod pattern;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AgentResult, Submission};

pub use pattern::PatternAgent;
pub use remote::RemoteAgent;

/// Identifier for one analysis backend in the startup manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    /// Code syntax, performance, and architecture analysis
    DeepSeek,
    /// Logic flow, edge cases, and security review
    Claude,
    /// Unconstrained risk analysis and unconventional code
    Grok,
    /// Pattern recognition and data validation
    Gemini,
    /// General-purpose review and standards
    OpenAi,
    /// Hierarchical step-by-step reasoning chains
    HrmReasoning,
    /// Numerical precision and statistical correctness
    MathematicalValidator,
    /// Compliance and usage-boundary assessment
    EthicalValidator,
    /// Bottleneck detection and scalability
    PerformanceAnalyzer,
    /// Local deterministic dangerous-pattern scan
    PatternMatcher,
}

impl AgentId {
    /// Static reliability weight (0-1) applied during consensus aggregation
    ///
    /// Higher weights indicate deeper reasoning backends. This is the only
    /// way an agent may bias aggregation; specialties are informational.
    pub fn weight(&self) -> f64 {
        match self {
            AgentId::Claude => 1.0,
            AgentId::HrmReasoning => 1.0,
            AgentId::MathematicalValidator => 1.0,
            AgentId::DeepSeek => 0.85,
            AgentId::Grok => 0.85,
            AgentId::OpenAi => 0.85,
            AgentId::EthicalValidator => 0.85,
            AgentId::PerformanceAnalyzer => 0.85,
            AgentId::Gemini => 0.7,
            AgentId::PatternMatcher => 0.6,
        }
    }

    /// Specialty tags shown alongside results; never used for aggregation
    pub fn specialties(&self) -> &'static [&'static str] {
        match self {
            AgentId::DeepSeek => &["algorithms", "performance", "architecture"],
            AgentId::Claude => &["security", "best_practices", "code_review"],
            AgentId::Grok => &["edge_cases", "risk_analysis"],
            AgentId::Gemini => &["data_analysis", "pattern_matching"],
            AgentId::OpenAi => &["documentation", "standards"],
            AgentId::HrmReasoning => &["complex_logic", "reasoning_chains"],
            AgentId::MathematicalValidator => &["mathematics", "statistics"],
            AgentId::EthicalValidator => &["compliance", "legal_boundaries"],
            AgentId::PerformanceAnalyzer => &["performance", "scalability"],
            AgentId::PatternMatcher => &["static_analysis"],
        }
    }

    /// Model name sent to the remote chat-completions endpoint
    pub fn api_name(&self) -> &'static str {
        match self {
            AgentId::DeepSeek => "deepseek/deepseek-chat",
            AgentId::Claude => "anthropic/claude-3.5-sonnet",
            AgentId::Grok => "x-ai/grok-2",
            AgentId::Gemini => "google/gemini-pro-1.5",
            AgentId::OpenAi => "openai/gpt-4o",
            AgentId::HrmReasoning => "anthropic/claude-3.5-sonnet",
            AgentId::MathematicalValidator => "deepseek/deepseek-chat",
            AgentId::EthicalValidator => "anthropic/claude-3.5-sonnet",
            AgentId::PerformanceAnalyzer => "deepseek/deepseek-chat",
            AgentId::PatternMatcher => "local",
        }
    }

    /// All agents in the manifest
    pub fn all() -> &'static [AgentId] {
        &[
            AgentId::DeepSeek,
            AgentId::Claude,
            AgentId::Grok,
            AgentId::Gemini,
            AgentId::OpenAi,
            AgentId::HrmReasoning,
            AgentId::MathematicalValidator,
            AgentId::EthicalValidator,
            AgentId::PerformanceAnalyzer,
            AgentId::PatternMatcher,
        ]
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentId::DeepSeek => "deepseek",
            AgentId::Claude => "claude",
            AgentId::Grok => "grok",
            AgentId::Gemini => "gemini",
            AgentId::OpenAi => "openai",
            AgentId::HrmReasoning => "hrm_reasoning",
            AgentId::MathematicalValidator => "mathematical_validator",
            AgentId::EthicalValidator => "ethical_validator",
            AgentId::PerformanceAnalyzer => "performance_analyzer",
            AgentId::PatternMatcher => "pattern_matcher",
        };
        write!(f, "{name}")
    }
}

/// Error type for agent invocations
///
/// All variants are non-fatal to a submission: the orchestrator drops the
/// failing agent from aggregation and carries on.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent} timed out after {elapsed_ms}ms")]
    Timeout { agent: AgentId, elapsed_ms: u64 },

    #[error("agent {agent} transport failure: {reason}")]
    Transport { agent: AgentId, reason: String },

    #[error("agent {agent} returned a malformed response: {reason}")]
    MalformedResponse { agent: AgentId, reason: String },
}

impl AgentError {
    /// The agent that failed
    pub fn agent(&self) -> AgentId {
        match self {
            AgentError::Timeout { agent, .. } => *agent,
            AgentError::Transport { agent, .. } => *agent,
            AgentError::MalformedResponse { agent, .. } => *agent,
        }
    }

    /// Short kind tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Timeout { .. } => "timeout",
            AgentError::Transport { .. } => "transport",
            AgentError::MalformedResponse { .. } => "malformed_response",
        }
    }
}

/// Result type for agent invocations
pub type AgentInvokeResult = Result<AgentResult, AgentError>;

/// Shared reference to a boxed agent adapter
pub type SharedAgent = Arc<dyn AgentAdapter>;

/// Uniform interface over one analysis backend
///
/// Adapters enforce their own absolute timeout and never retry: a failed
/// call surfaces as an [`AgentError`] and the caller decides policy.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Which manifest entry this adapter implements
    fn id(&self) -> AgentId;

    /// Analyze a submission and produce a normalized result
    async fn invoke(&self, submission: &Submission) -> AgentInvokeResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_weights_in_range() {
        for agent in AgentId::all() {
            let w = agent.weight();
            assert!((0.0..=1.0).contains(&w), "{agent} weight out of range");
        }
    }

    #[test]
    fn test_reasoning_tiers() {
        assert!(AgentId::Claude.weight() > AgentId::DeepSeek.weight());
        assert!(AgentId::DeepSeek.weight() > AgentId::Gemini.weight());
        assert!(AgentId::Gemini.weight() > AgentId::PatternMatcher.weight());
        assert_eq!(AgentId::Claude.weight(), AgentId::HrmReasoning.weight());
    }

    #[test]
    fn test_display_matches_serde() {
        for agent in AgentId::all() {
            let json = serde_json::to_string(agent).unwrap();
            assert_eq!(json, format!("\"{agent}\""));
        }
    }

    #[test]
    fn test_error_accessors() {
        let err = AgentError::Timeout {
            agent: AgentId::Grok,
            elapsed_ms: 30_000,
        };
        assert_eq!(err.agent(), AgentId::Grok);
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("30000ms"));
    }
}
