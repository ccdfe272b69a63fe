//! Session registry and per-session broadcast
//!
//! Sessions are the only mutable shared state in the process. Each session
//! owns one `tokio::sync::Mutex` over its state and one broadcast channel
//! for its events, so operations on the same session serialize while
//! different sessions proceed fully in parallel, and no event can leak
//! across session identifiers.
//!
//! Lifecycle: a session is created lazily on first join and torn down the
//! moment its last user leaves. Teardown is immediate and final: re-joining
//! the same identifier creates a fresh instance with empty history. This
//! data-loss boundary is deliberate; transient history does not survive an
//! empty session. Results from validations that outlive their session
//! instance are rejected by instance mismatch instead of being broadcast
//! into an unrelated recreation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::SessionEvent;
use crate::types::{ConnectionId, ConsensusResult, Submission, SubmissionId, SubmissionStatus};

/// Unique identifier for sessions
pub type SessionId = String;

/// Broadcast capacity per session
const CHANNEL_CAPACITY: usize = 256;

/// Longest accepted session identifier
const MAX_SESSION_ID_LEN: usize = 128;

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {0} is gone; its instance was torn down")]
    SessionGone(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A user connected to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Transport connection identifier
    pub connection_id: ConnectionId,
    /// Display name
    pub username: String,
    /// Optional avatar reference
    pub avatar: Option<String>,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

impl User {
    /// Create a user joining now
    pub fn new(connection_id: impl Into<ConnectionId>, username: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            username: username.into(),
            avatar: None,
            joined_at: Utc::now(),
        }
    }

    /// Set the avatar reference
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Point-in-time view of one session, given to late joiners and admin reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub users: Vec<User>,
    pub submissions: Vec<Submission>,
    pub results: Vec<ConsensusResult>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Compact per-session row for the admin session list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOverview {
    pub session_id: SessionId,
    pub user_count: usize,
    pub submission_count: usize,
    pub result_count: usize,
    pub last_activity: DateTime<Utc>,
}

/// What a joining user receives: context plus a live event subscription
#[derive(Debug)]
pub struct JoinedSession {
    /// Bounded recent history for late-joiner context
    pub snapshot: SessionSnapshot,
    /// Instance token; required to record against this session instance
    pub instance: Uuid,
    /// Subscription to this session's events
    pub events: broadcast::Receiver<SessionEvent>,
}

struct SessionState {
    users: HashMap<ConnectionId, User>,
    submissions: VecDeque<Submission>,
    results: VecDeque<ConsensusResult>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl SessionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            users: HashMap::new(),
            submissions: VecDeque::new(),
            results: VecDeque::new(),
            created_at: now,
            last_activity: now,
        }
    }

    fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id: session_id.to_string(),
            users: self.users.values().cloned().collect(),
            submissions: self.submissions.iter().cloned().collect(),
            results: self.results.iter().cloned().collect(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// One live session: serialized state plus its broadcast channel
pub struct SessionHandle {
    id: SessionId,
    instance: Uuid,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    fn new(id: SessionId) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            id,
            instance: Uuid::new_v4(),
            state: Mutex::new(SessionState::new()),
            events,
        }
    }

    fn send(&self, event: SessionEvent) {
        // No receivers just means nobody is listening yet; not an error.
        let _ = self.events.send(event);
    }
}

/// Shared reference to the session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

/// Keyed store of live sessions behind a narrow join/leave/record interface
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    history_cap: usize,
}

impl SessionRegistry {
    /// Create a registry with the given per-session history cap
    pub fn new(history_cap: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_cap,
        }
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> SharedSessionRegistry {
        Arc::new(self)
    }

    /// Join a session, creating it if absent
    ///
    /// Returns the bounded recent history plus a live subscription. The
    /// subscription is taken before the join event is published, so the
    /// joiner observes everything from its own join onward.
    pub async fn join(&self, session_id: &str, user: User) -> RegistryResult<JoinedSession> {
        validate_session_id(session_id)?;

        let handle = {
            let mut sessions = self.sessions.write().await;
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    info!(session_id, "creating session");
                    Arc::new(SessionHandle::new(session_id.to_string()))
                })
                .clone()
        };

        let mut state = handle.state.lock().await;
        let event = SessionEvent::UserJoined {
            session_id: handle.id.clone(),
            connection_id: user.connection_id.clone(),
            username: user.username.clone(),
            timestamp: Utc::now(),
        };
        state.users.insert(user.connection_id.clone(), user);
        state.last_activity = Utc::now();

        let events = handle.events.subscribe();
        let snapshot = state.snapshot(&handle.id);
        handle.send(event);

        debug!(session_id, users = state.users.len(), "user joined");

        Ok(JoinedSession {
            snapshot,
            instance: handle.instance,
            events,
        })
    }

    /// Remove a user from a session; tears the session down when it empties
    ///
    /// Returns true when the session was destroyed.
    pub async fn leave(&self, session_id: &str, connection_id: &str) -> RegistryResult<bool> {
        // The map write lock is held across the membership change so a
        // concurrent join cannot land between the empty check and removal.
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;

        let empty = {
            let mut state = handle.state.lock().await;
            let Some(user) = state.users.remove(connection_id) else {
                return Ok(false);
            };
            state.last_activity = Utc::now();
            handle.send(SessionEvent::UserLeft {
                session_id: handle.id.clone(),
                connection_id: user.connection_id,
                username: user.username,
                timestamp: Utc::now(),
            });
            state.users.is_empty()
        };

        if empty {
            sessions.remove(session_id);
            info!(session_id, "last user left; session torn down");
        }

        Ok(empty)
    }

    /// Record a submission into the session's bounded history
    pub async fn record_submission(
        &self,
        session_id: &str,
        instance: Uuid,
        submission: Submission,
    ) -> RegistryResult<()> {
        let handle = self.live_handle(session_id, instance).await?;
        let mut state = handle.state.lock().await;

        let event = SessionEvent::SubmissionReceived {
            session_id: handle.id.clone(),
            submission_id: submission.id.clone(),
            connection_id: submission.connection_id.clone(),
            validation_type: submission.validation_type,
            timestamp: Utc::now(),
        };

        state.submissions.push_back(submission);
        while state.submissions.len() > self.history_cap {
            state.submissions.pop_front();
        }
        state.last_activity = Utc::now();
        handle.send(event);

        Ok(())
    }

    /// Record a consensus result and broadcast completion
    ///
    /// Fails with [`RegistryError::SessionGone`] when the session instance
    /// observed at submission time no longer exists; the caller discards the
    /// result instead of broadcasting it.
    pub async fn record_result(
        &self,
        session_id: &str,
        instance: Uuid,
        result: ConsensusResult,
    ) -> RegistryResult<()> {
        let handle = self.live_handle(session_id, instance).await?;
        let mut state = handle.state.lock().await;

        if let Some(submission) = state
            .submissions
            .iter_mut()
            .find(|s| s.id == result.submission_id)
        {
            submission.status = SubmissionStatus::Complete;
        }

        let event = SessionEvent::ValidationCompleted {
            session_id: handle.id.clone(),
            submission_id: result.submission_id.clone(),
            result: Box::new(result.clone()),
            timestamp: Utc::now(),
        };

        state.results.push_back(result);
        while state.results.len() > self.history_cap {
            state.results.pop_front();
        }
        state.last_activity = Utc::now();
        handle.send(event);

        Ok(())
    }

    /// Mark a submission failed and broadcast the failure
    pub async fn record_failure(
        &self,
        session_id: &str,
        instance: Uuid,
        submission_id: &SubmissionId,
        error: &str,
    ) -> RegistryResult<()> {
        let handle = self.live_handle(session_id, instance).await?;
        let mut state = handle.state.lock().await;

        if let Some(submission) = state.submissions.iter_mut().find(|s| &s.id == submission_id) {
            submission.status = SubmissionStatus::Failed;
        }
        state.last_activity = Utc::now();

        handle.send(SessionEvent::ValidationFailed {
            session_id: handle.id.clone(),
            submission_id: submission_id.clone(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Publish a transient event (validation started, typing) into a session
    pub async fn publish(
        &self,
        session_id: &str,
        instance: Uuid,
        event: SessionEvent,
    ) -> RegistryResult<()> {
        let handle = self.live_handle(session_id, instance).await?;
        // Lock the state so event order matches record order for the session.
        let _state = handle.state.lock().await;
        handle.send(event);
        Ok(())
    }

    /// Full snapshot of one session (admin surface)
    pub async fn snapshot(&self, session_id: &str) -> RegistryResult<SessionSnapshot> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?
        };
        let state = handle.state.lock().await;
        Ok(state.snapshot(&handle.id))
    }

    /// Overview rows for every live session (admin surface)
    pub async fn list_sessions(&self) -> Vec<SessionOverview> {
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut overviews = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.state.lock().await;
            overviews.push(SessionOverview {
                session_id: handle.id.clone(),
                user_count: state.users.len(),
                submission_count: state.submissions.len(),
                result_count: state.results.len(),
                last_activity: state.last_activity,
            });
        }
        overviews.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        overviews
    }

    /// Active session and connected user counts (liveness probe)
    pub async fn counts(&self) -> (usize, usize) {
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut users = 0;
        for handle in &handles {
            users += handle.state.lock().await.users.len();
        }
        (handles.len(), users)
    }

    async fn live_handle(
        &self,
        session_id: &str,
        instance: Uuid,
    ) -> RegistryResult<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::SessionGone(session_id.to_string()))?;

        if handle.instance != instance {
            warn!(
                session_id,
                "stale instance token; session was recreated since submission"
            );
            return Err(RegistryError::SessionGone(session_id.to_string()));
        }
        Ok(handle)
    }
}

fn validate_session_id(session_id: &str) -> RegistryResult<()> {
    if session_id.is_empty() {
        return Err(RegistryError::InvalidSessionId("empty identifier".into()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(RegistryError::InvalidSessionId(format!(
            "identifier longer than {MAX_SESSION_ID_LEN} bytes"
        )));
    }
    if session_id.chars().any(|c| c.is_control()) {
        return Err(RegistryError::InvalidSessionId(
            "identifier contains control characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationType;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(10)
    }

    #[tokio::test]
    async fn test_join_creates_session() {
        let registry = registry();
        let joined = registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();

        assert_eq!(joined.snapshot.users.len(), 1);
        assert!(joined.snapshot.submissions.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_session_ids_rejected() {
        let registry = registry();

        for bad in ["", "has\ncontrol", &"x".repeat(200)] {
            let err = registry
                .join(bad, User::new("conn-1", "alice"))
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidSessionId(_)));
        }
    }

    #[tokio::test]
    async fn test_teardown_on_last_leave() {
        let registry = registry();
        registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();

        let torn_down = registry.leave("demo-1", "conn-1").await.unwrap();
        assert!(torn_down);

        let err = registry.snapshot("demo-1").await.unwrap_err();
        assert!(matches!(err, RegistryError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejoin_after_teardown_is_fresh() {
        let registry = registry();
        let first = registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();

        let sub = Submission::new("conn-1", "x = 1", ValidationType::GeneralValidation);
        registry
            .record_submission("demo-1", first.instance, sub)
            .await
            .unwrap();

        registry.leave("demo-1", "conn-1").await.unwrap();

        let second = registry
            .join("demo-1", User::new("conn-2", "bob"))
            .await
            .unwrap();
        assert!(second.snapshot.submissions.is_empty());
        assert_ne!(first.instance, second.instance);
    }

    #[tokio::test]
    async fn test_history_fifo_and_cap() {
        let registry = SessionRegistry::new(3);
        let joined = registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();

        for i in 0..5 {
            let sub = Submission::new(
                "conn-1",
                format!("code {i}"),
                ValidationType::GeneralValidation,
            );
            registry
                .record_submission("demo-1", joined.instance, sub)
                .await
                .unwrap();
        }

        let snapshot = registry.snapshot("demo-1").await.unwrap();
        let codes: Vec<&str> = snapshot.submissions.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["code 2", "code 3", "code 4"]);
    }

    #[tokio::test]
    async fn test_stale_instance_rejected() {
        let registry = registry();
        let first = registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();
        registry.leave("demo-1", "conn-1").await.unwrap();
        registry
            .join("demo-1", User::new("conn-2", "bob"))
            .await
            .unwrap();

        let sub = Submission::new("conn-1", "x = 1", ValidationType::GeneralValidation);
        let err = registry
            .record_submission("demo-1", first.instance, sub)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SessionGone(_)));
    }

    #[tokio::test]
    async fn test_events_isolated_per_session() {
        let registry = registry();
        let mut a = registry
            .join("session-a", User::new("conn-a", "alice"))
            .await
            .unwrap();
        let _b = registry
            .join("session-b", User::new("conn-b", "bob"))
            .await
            .unwrap();

        // Alice sees her own join, then bob's activity must never appear.
        let first = a.events.recv().await.unwrap();
        assert_eq!(first.session_id(), "session-a");

        let typing = SessionEvent::Typing {
            session_id: "session-b".into(),
            connection_id: "conn-b".into(),
            username: "bob".into(),
            timestamp: Utc::now(),
        };
        let b_instance = registry
            .join("session-b", User::new("conn-b2", "bea"))
            .await
            .unwrap()
            .instance;
        registry
            .publish("session-b", b_instance, typing)
            .await
            .unwrap();

        // Nothing further should be pending for alice.
        assert!(matches!(
            a.events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_leave_unknown_user_is_noop() {
        let registry = registry();
        registry
            .join("demo-1", User::new("conn-1", "alice"))
            .await
            .unwrap();

        let torn_down = registry.leave("demo-1", "ghost").await.unwrap();
        assert!(!torn_down);
        assert!(registry.snapshot("demo-1").await.is_ok());
    }
}
