//! Multi-agent consensus validation library
//!
//! This library provides:
//! - Agent adapters normalizing heterogeneous analysis backends
//! - A stateless consensus orchestrator with quorum and weighted aggregation
//! - Issue classification with per-chain critical vocabulary
//! - A deterministic fallback cache for offline operation
//! - A session registry with per-session serialization and broadcast fan-out
//!
//! # Control flow
//!
//! ```text
//! client ──▶ SessionRegistry ──▶ broadcast: validation_started
//!                 │
//!                 ▼
//!        ConsensusOrchestrator ──▶ AgentAdapter × N (concurrent, timed out)
//!                 │                        │
//!                 │            quorum miss ▼
//!                 │                 FallbackCache
//!                 ▼
//!          IssueClassifier
//!                 │
//!                 ▼
//!        SessionRegistry ──▶ broadcast: validation_completed
//! ```

pub mod agents;
pub mod classifier;
pub mod config;
pub mod delivery;
pub mod events;
pub mod fallback;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod types;

// Re-export key agent types
pub use agents::{AgentAdapter, AgentError, AgentId, PatternAgent, RemoteAgent, SharedAgent};

// Re-export key orchestration types
pub use orchestrator::{ConsensusOrchestrator, SharedOrchestrator};

// Re-export classification types
pub use classifier::{Classified, ClassifiedIssue, IssueClassifier, Severity};

// Re-export fallback types
pub use fallback::FallbackCache;

// Re-export configuration types
pub use config::{ChainConfig, EndpointConfig, RatingThresholds, ValidationConfig};

// Re-export session types
pub use session::{
    JoinedSession, RegistryError, SessionId, SessionOverview, SessionRegistry, SessionSnapshot,
    SharedSessionRegistry, User,
};

// Re-export event types
pub use events::SessionEvent;

// Re-export delivery types
pub use delivery::{DeliveryError, HttpReportSink, NoopReportSink, ReportSink};

// Re-export core domain types
pub use types::{
    AgentResult, ConnectionId, ConsensusResult, EnhancedMetrics, Rating, Submission,
    SubmissionId, SubmissionStatus, ValidationType,
};
