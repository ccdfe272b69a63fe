//! Session lifecycle events
//!
//! These drive the per-session broadcast channel. Every member of a session
//! receives them in the order they were recorded for that session; nothing
//! crosses session boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::session::SessionId;
use crate::types::{ConnectionId, ConsensusResult, SubmissionId, ValidationType};

/// All events broadcast within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A user joined the session
    UserJoined {
        session_id: SessionId,
        connection_id: ConnectionId,
        username: String,
        timestamp: DateTime<Utc>,
    },

    /// A user left the session
    UserLeft {
        session_id: SessionId,
        connection_id: ConnectionId,
        username: String,
        timestamp: DateTime<Utc>,
    },

    /// A code submission was recorded
    SubmissionReceived {
        session_id: SessionId,
        submission_id: SubmissionId,
        connection_id: ConnectionId,
        validation_type: ValidationType,
        timestamp: DateTime<Utc>,
    },

    /// The submission was dispatched to its agent chain
    ValidationStarted {
        session_id: SessionId,
        submission_id: SubmissionId,
        validation_type: ValidationType,
        agents: Vec<AgentId>,
        timestamp: DateTime<Utc>,
    },

    /// Consensus was reached and the result recorded
    ValidationCompleted {
        session_id: SessionId,
        submission_id: SubmissionId,
        result: Box<ConsensusResult>,
        timestamp: DateTime<Utc>,
    },

    /// Validation aborted with an error
    ValidationFailed {
        session_id: SessionId,
        submission_id: SubmissionId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A user is typing (presence hint, not persisted)
    Typing {
        session_id: SessionId,
        connection_id: ConnectionId,
        username: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Event type tag used in logs and wire payloads
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::UserJoined { .. } => "user_joined",
            SessionEvent::UserLeft { .. } => "user_left",
            SessionEvent::SubmissionReceived { .. } => "submission_received",
            SessionEvent::ValidationStarted { .. } => "validation_started",
            SessionEvent::ValidationCompleted { .. } => "validation_completed",
            SessionEvent::ValidationFailed { .. } => "validation_failed",
            SessionEvent::Typing { .. } => "typing",
        }
    }

    /// The session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::UserJoined { session_id, .. } => session_id,
            SessionEvent::UserLeft { session_id, .. } => session_id,
            SessionEvent::SubmissionReceived { session_id, .. } => session_id,
            SessionEvent::ValidationStarted { session_id, .. } => session_id,
            SessionEvent::ValidationCompleted { session_id, .. } => session_id,
            SessionEvent::ValidationFailed { session_id, .. } => session_id,
            SessionEvent::Typing { session_id, .. } => session_id,
        }
    }

    /// When the event occurred
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::UserJoined { timestamp, .. } => *timestamp,
            SessionEvent::UserLeft { timestamp, .. } => *timestamp,
            SessionEvent::SubmissionReceived { timestamp, .. } => *timestamp,
            SessionEvent::ValidationStarted { timestamp, .. } => *timestamp,
            SessionEvent::ValidationCompleted { timestamp, .. } => *timestamp,
            SessionEvent::ValidationFailed { timestamp, .. } => *timestamp,
            SessionEvent::Typing { timestamp, .. } => *timestamp,
        }
    }
}
