//! Core domain types for multi-agent code validation
//!
//! These types flow between the gateway, the consensus orchestrator, and the
//! session registry. Submissions are mutable only in their status field;
//! agent results and consensus results are immutable once produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// Unique identifier for submissions
pub type SubmissionId = String;

/// Unique identifier for a connected user (one per transport connection)
pub type ConnectionId = String;

/// The kind of validation requested for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// Syntax, logic, performance, best practices
    GeneralValidation,
    /// Cryptocurrency / smart-contract code audit
    CryptoAudit,
    /// Betting and odds-calculation algorithm analysis
    BettingAlgorithm,
    /// Penetration-testing and security tooling review
    SecurityTesting,
}

impl ValidationType {
    /// Stable string form, used for config keys and fallback seeding
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::GeneralValidation => "general_validation",
            ValidationType::CryptoAudit => "crypto_audit",
            ValidationType::BettingAlgorithm => "betting_algorithm",
            ValidationType::SecurityTesting => "security_testing",
        }
    }

    /// All validation types
    pub fn all() -> &'static [ValidationType] {
        &[
            ValidationType::GeneralValidation,
            ValidationType::CryptoAudit,
            ValidationType::BettingAlgorithm,
            ValidationType::SecurityTesting,
        ]
    }
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Received, not yet dispatched to agents
    Pending,
    /// Agents are currently analyzing
    Validating,
    /// Consensus result recorded
    Complete,
    /// Validation aborted with an error
    Failed,
}

/// A piece of code submitted by a user for validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Unique submission identifier
    pub id: SubmissionId,

    /// Connection that submitted this code
    pub connection_id: ConnectionId,

    /// The code text under validation
    pub code: String,

    /// Which validation chain to run
    pub validation_type: ValidationType,

    /// Target language of the code (informational)
    pub language: String,

    /// Apply stricter rating bands and stricter agent instructions
    pub heightened_scrutiny: bool,

    /// Deliver a report through the configured sink after validation
    pub request_report_delivery: bool,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,

    /// Current lifecycle status
    pub status: SubmissionStatus,
}

impl Submission {
    /// Create a new pending submission
    pub fn new(
        connection_id: impl Into<ConnectionId>,
        code: impl Into<String>,
        validation_type: ValidationType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.into(),
            code: code.into(),
            validation_type,
            language: "python".to_string(),
            heightened_scrutiny: false,
            request_report_delivery: false,
            submitted_at: Utc::now(),
            status: SubmissionStatus::Pending,
        }
    }

    /// Set the target language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Enable heightened scrutiny
    pub fn with_heightened_scrutiny(mut self, on: bool) -> Self {
        self.heightened_scrutiny = on;
        self
    }

    /// Request report delivery
    pub fn with_report_delivery(mut self, on: bool) -> Self {
        self.request_report_delivery = on;
        self
    }

    /// Mark the submission as dispatched to agents
    pub fn start_validating(&mut self) {
        self.status = SubmissionStatus::Validating;
    }
}

/// Result from a single agent's analysis of a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Agent that produced this result
    pub agent: AgentId,

    /// Self-reported confidence (0.0-1.0)
    pub confidence: f64,

    /// Issues found, in the order the agent raised them
    pub issues: Vec<String>,

    /// Improvement suggestions, in agent order
    pub suggestions: Vec<String>,

    /// Free-text rationale for the verdict
    pub rationale: String,

    /// Wall-clock duration of the agent call
    pub duration_ms: u64,

    /// Whether the agent call succeeded
    pub success: bool,
}

impl AgentResult {
    /// Create a successful agent result
    pub fn new(agent: AgentId, confidence: f64, duration_ms: u64) -> Self {
        Self {
            agent,
            confidence: confidence.clamp(0.0, 1.0),
            issues: Vec::new(),
            suggestions: Vec::new(),
            rationale: String::new(),
            duration_ms,
            success: true,
        }
    }

    /// Set the issue list
    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    /// Set the suggestion list
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Set the rationale text
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// Ordinal quality rating derived from weighted consensus confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    NeedsImprovement,
    Satisfactory,
    Good,
    VeryGood,
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rating::NeedsImprovement => write!(f, "NEEDS_IMPROVEMENT"),
            Rating::Satisfactory => write!(f, "SATISFACTORY"),
            Rating::Good => write!(f, "GOOD"),
            Rating::VeryGood => write!(f, "VERY_GOOD"),
        }
    }
}

/// Derived code-quality metrics attached to every consensus result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedMetrics {
    /// Structural complexity of the submitted code (0.0-1.0)
    pub complexity_score: f64,
    /// Share of issues that are not security-related (0.0-1.0)
    pub security_score: f64,
    /// Comment density, length, and naming signals combined (0.0-1.0)
    pub maintainability_score: f64,
    /// The weighted consensus confidence, duplicated here for report payloads
    pub weighted_confidence: f64,
}

/// The aggregate verdict for one submission
///
/// Created exactly once per submission by the orchestrator. When `offline`
/// is true the result was synthesized from the fallback cache and
/// `agents_used` is empty: a fallback result never claims agent identities
/// it does not have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Submission this verdict belongs to
    pub submission_id: SubmissionId,

    /// Ordinal rating mapped from the weighted confidence
    pub overall_rating: Rating,

    /// Weighted aggregate of the succeeding agents' confidences
    pub consensus_confidence: f64,

    /// Deduplicated issues across all succeeding agents
    pub issues_found: Vec<String>,

    /// Subset of issues promoted to priority severity
    pub priority_issues: Vec<String>,

    /// Deduplicated suggestions across all succeeding agents
    pub suggestions: Vec<String>,

    /// Agents whose results contributed to this verdict
    pub agents_used: Vec<AgentId>,

    /// Per-agent result snapshot
    pub agent_details: Vec<AgentResult>,

    /// Derived code-quality metrics
    pub enhanced_metrics: EnhancedMetrics,

    /// True when this verdict came from the fallback cache
    pub offline: bool,

    /// When aggregation finished
    pub completed_at: DateTime<Utc>,
}
