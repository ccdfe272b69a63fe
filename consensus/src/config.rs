//! Validation configuration
//!
//! Chains, thresholds, quorum, and timeouts are configuration rather than
//! constants so they can be tuned per deployment and per validation type.
//! Defaults come from environment variables where it makes sense (endpoint
//! credentials) and are otherwise complete, so the platform runs with no
//! config file at all.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::types::{Rating, ValidationType};

/// Remote chat-completions endpoint shared by all remote agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the chat-completions API
    pub url: String,
    /// Bearer token; empty disables remote agents
    pub api_key: String,
    /// Max tokens requested per analysis
    pub max_tokens: u32,
    /// Sampling temperature for analysis calls
    pub temperature: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("VALIDATOR_ENDPOINT_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".into()),
            api_key: std::env::var("VALIDATOR_API_KEY").unwrap_or_default(),
            max_tokens: 500,
            temperature: 0.1,
        }
    }
}

/// Rating thresholds mapping weighted confidence to an ordinal band
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatingThresholds {
    /// Confidence at or above which a result is at least satisfactory
    pub satisfactory: f64,
    /// Confidence at or above which a result is at least good
    pub good: f64,
    /// Confidence at or above which a result is very good
    pub very_good: f64,
    /// Added to every threshold when heightened scrutiny is requested
    pub scrutiny_margin: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            satisfactory: 0.5,
            good: 0.7,
            very_good: 0.85,
            scrutiny_margin: 0.05,
        }
    }
}

impl RatingThresholds {
    /// Map a weighted confidence to its rating band
    pub fn rating(&self, confidence: f64, heightened_scrutiny: bool) -> Rating {
        let margin = if heightened_scrutiny {
            self.scrutiny_margin
        } else {
            0.0
        };

        if confidence >= self.very_good + margin {
            Rating::VeryGood
        } else if confidence >= self.good + margin {
            Rating::Good
        } else if confidence >= self.satisfactory + margin {
            Rating::Satisfactory
        } else {
            Rating::NeedsImprovement
        }
    }
}

/// One validation chain: which agents run and how their findings are judged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Human-readable chain name
    pub name: String,
    /// Agents dispatched for this validation type, in display order
    pub agents: Vec<AgentId>,
    /// Focus areas injected into remote agent prompts
    pub focus: String,
    /// Terms that promote an issue to priority severity
    pub critical_vocabulary: Vec<String>,
    /// Inclusive confidence range for fallback results of this type
    pub fallback_confidence: (f64, f64),
    /// Optional per-type rating threshold override
    pub thresholds: Option<RatingThresholds>,
}

/// Top-level configuration for the validation platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Remote agent endpoint
    pub endpoint: EndpointConfig,
    /// Absolute timeout per agent invocation, seconds
    pub agent_timeout_secs: u64,
    /// Minimum succeeding agents for a live (non-fallback) result
    pub quorum: usize,
    /// Concurrent outbound agent calls per submission
    pub max_parallel_agents: usize,
    /// Submissions and results retained per session
    pub history_cap: usize,
    /// Token-overlap similarity at or above which two issues are duplicates
    pub fuzzy_threshold: f64,
    /// Default rating thresholds, overridable per chain
    pub thresholds: RatingThresholds,
    /// Validation chains keyed by type
    pub chains: HashMap<ValidationType, ChainConfig>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            ValidationType::CryptoAudit,
            ChainConfig {
                name: "Cryptocurrency Code Audit".into(),
                agents: vec![
                    AgentId::DeepSeek,
                    AgentId::Claude,
                    AgentId::Grok,
                    AgentId::HrmReasoning,
                    AgentId::PatternMatcher,
                ],
                focus: "Security vulnerabilities, economic attacks, smart contract issues, \
                        regulatory compliance"
                    .into(),
                critical_vocabulary: vec![
                    "reentrancy".into(),
                    "integer overflow".into(),
                    "race condition".into(),
                    "decimal precision".into(),
                    "injection".into(),
                    "hardcoded".into(),
                    "private key".into(),
                ],
                fallback_confidence: (0.5, 0.75),
                thresholds: None,
            },
        );

        chains.insert(
            ValidationType::BettingAlgorithm,
            ChainConfig {
                name: "Betting Algorithm Analysis".into(),
                agents: vec![
                    AgentId::DeepSeek,
                    AgentId::Gemini,
                    AgentId::OpenAi,
                    AgentId::MathematicalValidator,
                    AgentId::PatternMatcher,
                ],
                focus: "Mathematical correctness, edge cases, risk management, Kelly criterion \
                        validation"
                    .into(),
                critical_vocabulary: vec![
                    "kelly".into(),
                    "probability".into(),
                    "precision".into(),
                    "bankroll".into(),
                    "overflow".into(),
                    "injection".into(),
                ],
                fallback_confidence: (0.55, 0.8),
                thresholds: None,
            },
        );

        chains.insert(
            ValidationType::SecurityTesting,
            ChainConfig {
                name: "Security Testing Code Review".into(),
                agents: vec![
                    AgentId::Grok,
                    AgentId::DeepSeek,
                    AgentId::Claude,
                    AgentId::EthicalValidator,
                    AgentId::PatternMatcher,
                ],
                focus: "Penetration testing logic, ethical boundaries, effectiveness, legal \
                        compliance"
                    .into(),
                critical_vocabulary: vec![
                    "injection".into(),
                    "command injection".into(),
                    "hardcoded".into(),
                    "exploit".into(),
                    "authorization".into(),
                    "xss".into(),
                    "overflow".into(),
                ],
                fallback_confidence: (0.5, 0.75),
                thresholds: None,
            },
        );

        chains.insert(
            ValidationType::GeneralValidation,
            ChainConfig {
                name: "General Code Validation".into(),
                agents: vec![
                    AgentId::DeepSeek,
                    AgentId::Claude,
                    AgentId::PerformanceAnalyzer,
                    AgentId::PatternMatcher,
                ],
                focus: "Syntax, logic, performance, best practices, maintainability".into(),
                critical_vocabulary: vec![
                    "injection".into(),
                    "hardcoded secret".into(),
                    "hardcoded credentials".into(),
                    "overflow".into(),
                ],
                fallback_confidence: (0.6, 0.85),
                thresholds: None,
            },
        );

        Self {
            endpoint: EndpointConfig::default(),
            agent_timeout_secs: 30,
            quorum: 2,
            max_parallel_agents: 4,
            history_cap: 10,
            fuzzy_threshold: 0.8,
            thresholds: RatingThresholds::default(),
            chains,
        }
    }
}

impl ValidationConfig {
    /// Load configuration from a TOML file, with defaults for absent keys
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// The chain for a validation type, defaulting to general validation
    pub fn chain_for(&self, validation_type: ValidationType) -> &ChainConfig {
        self.chains
            .get(&validation_type)
            .or_else(|| self.chains.get(&ValidationType::GeneralValidation))
            .expect("general_validation chain is always present in defaults")
    }

    /// Rating thresholds for a validation type (per-chain override or default)
    pub fn thresholds_for(&self, validation_type: ValidationType) -> RatingThresholds {
        self.chain_for(validation_type)
            .thresholds
            .unwrap_or(self.thresholds)
    }

    /// Per-agent timeout as a [`Duration`]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}
