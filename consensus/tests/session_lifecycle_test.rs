//! Session registry behavior under the collaborative flow: isolation, FIFO
//! history, teardown, late joiners, and discard of stale in-flight results.

mod support;

use std::sync::Arc;

use consensus::{
    AgentId, ConsensusOrchestrator, RegistryError, SessionEvent, SessionRegistry, Submission,
    User, ValidationConfig, ValidationType,
};
use support::ScriptedAgent;

fn orchestrator() -> ConsensusOrchestrator {
    ConsensusOrchestrator::new(
        Arc::new(ValidationConfig::default()),
        vec![
            ScriptedAgent::ok(AgentId::DeepSeek, 0.85).shared(),
            ScriptedAgent::ok(AgentId::Claude, 0.8).shared(),
        ],
    )
}

async fn drain_until<F>(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast channel closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn late_joiner_receives_other_users_completion() {
    let registry = SessionRegistry::new(10).shared();
    let orch = orchestrator().shared();

    let alice = registry
        .join("demo-1", User::new("conn-a", "alice"))
        .await
        .unwrap();
    let mut bob = registry
        .join("demo-1", User::new("conn-b", "bob"))
        .await
        .unwrap();

    let mut submission = Submission::new(
        "conn-a",
        "def add(a, b): return a + b",
        ValidationType::GeneralValidation,
    );
    submission.start_validating();
    let submission_id = submission.id.clone();

    registry
        .record_submission("demo-1", alice.instance, submission.clone())
        .await
        .unwrap();

    let result = orch.validate(&submission).await;
    registry
        .record_result("demo-1", alice.instance, result)
        .await
        .unwrap();

    let completed = drain_until(&mut bob.events, |e| {
        e.event_type() == "validation_completed"
    })
    .await;

    match completed {
        SessionEvent::ValidationCompleted {
            submission_id: sid,
            result,
            ..
        } => {
            assert_eq!(sid, submission_id);
            assert!(!result.offline);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_mid_validation_discards_result() {
    let registry = SessionRegistry::new(10).shared();
    let orch = orchestrator().shared();

    let alice = registry
        .join("demo-2", User::new("conn-a", "alice"))
        .await
        .unwrap();

    let mut submission = Submission::new("conn-a", "x = 1", ValidationType::GeneralValidation);
    submission.start_validating();
    registry
        .record_submission("demo-2", alice.instance, submission.clone())
        .await
        .unwrap();

    // Alice disconnects while her validation is still running; teardown.
    let torn_down = registry.leave("demo-2", "conn-a").await.unwrap();
    assert!(torn_down);

    // The in-flight agent calls finish naturally; recording is refused.
    let result = orch.validate(&submission).await;
    let err = registry
        .record_result("demo-2", alice.instance, result)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::SessionGone(_)));
}

#[tokio::test]
async fn stale_result_never_reaches_recreated_session() {
    let registry = SessionRegistry::new(10).shared();
    let orch = orchestrator().shared();

    let first = registry
        .join("demo-3", User::new("conn-a", "alice"))
        .await
        .unwrap();
    let mut submission = Submission::new("conn-a", "y = 2", ValidationType::GeneralValidation);
    submission.start_validating();
    registry
        .record_submission("demo-3", first.instance, submission.clone())
        .await
        .unwrap();
    registry.leave("demo-3", "conn-a").await.unwrap();

    // Same identifier, fresh instance.
    let mut second = registry
        .join("demo-3", User::new("conn-b", "bob"))
        .await
        .unwrap();
    assert!(second.snapshot.submissions.is_empty());

    let result = orch.validate(&submission).await;
    assert!(registry
        .record_result("demo-3", first.instance, result)
        .await
        .is_err());

    // Bob sees his own join and nothing from the first instance.
    let own_join = drain_until(&mut second.events, |e| e.event_type() == "user_joined").await;
    assert_eq!(own_join.session_id(), "demo-3");
    assert!(matches!(
        second.events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn history_is_fifo_for_late_joiners() {
    let registry = SessionRegistry::new(10).shared();
    let alice = registry
        .join("demo-4", User::new("conn-a", "alice"))
        .await
        .unwrap();

    let first = Submission::new("conn-a", "first", ValidationType::GeneralValidation);
    let second = Submission::new("conn-a", "second", ValidationType::GeneralValidation);
    registry
        .record_submission("demo-4", alice.instance, first)
        .await
        .unwrap();
    registry
        .record_submission("demo-4", alice.instance, second)
        .await
        .unwrap();

    let late = registry
        .join("demo-4", User::new("conn-b", "bob"))
        .await
        .unwrap();
    let codes: Vec<&str> = late
        .snapshot
        .submissions
        .iter()
        .map(|s| s.code.as_str())
        .collect();
    assert_eq!(codes, vec!["first", "second"]);
}

#[tokio::test]
async fn broadcasts_do_not_cross_sessions() {
    let registry = SessionRegistry::new(10).shared();

    let mut a = registry
        .join("room-a", User::new("conn-a", "alice"))
        .await
        .unwrap();
    let b = registry
        .join("room-b", User::new("conn-b", "bob"))
        .await
        .unwrap();

    let submission = Submission::new("conn-b", "z = 3", ValidationType::GeneralValidation);
    registry
        .record_submission("room-b", b.instance, submission)
        .await
        .unwrap();

    // Alice sees her own join and nothing from room-b.
    let own_join = drain_until(&mut a.events, |e| e.event_type() == "user_joined").await;
    assert_eq!(own_join.session_id(), "room-a");
    assert!(matches!(
        a.events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn concurrent_sessions_progress_independently() {
    let registry = SessionRegistry::new(10).shared();

    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let session_id = format!("parallel-{i}");
            let joined = registry
                .join(&session_id, User::new(format!("conn-{i}"), "user"))
                .await
                .unwrap();
            for j in 0..5 {
                let sub = Submission::new(
                    format!("conn-{i}"),
                    format!("code {j}"),
                    ValidationType::GeneralValidation,
                );
                registry
                    .record_submission(&session_id, joined.instance, sub)
                    .await
                    .unwrap();
            }
            registry.snapshot(&session_id).await.unwrap()
        }));
    }

    for handle in handles {
        let snapshot = handle.await.unwrap();
        assert_eq!(snapshot.submissions.len(), 5);
        assert_eq!(snapshot.users.len(), 1);
    }

    let (sessions, users) = registry.counts().await;
    assert_eq!(sessions, 8);
    assert_eq!(users, 8);
}
