//! WebSocket session transport
//!
//! One connection maps to one user in at most one session. Client messages
//! are tagged JSON; server replies are either direct messages
//! (`session_state`, `error`) or the session's broadcast events forwarded
//! verbatim, so every member observes the same ordered stream.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use consensus::{
    SessionEvent, SessionSnapshot, Submission, User, ValidationType,
};

use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    JoinSession {
        session_id: String,
        username: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    SubmitCode {
        code: String,
        validation_type: ValidationType,
        #[serde(default = "default_language")]
        language: String,
        #[serde(default)]
        heightened_scrutiny: bool,
        #[serde(default)]
        request_report_delivery: bool,
        #[serde(default)]
        report_recipient: Option<String>,
    },
    Typing,
    LeaveSession,
}

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    SessionState { session: SessionSnapshot },
    Error { message: String },
}

struct Membership {
    session_id: String,
    instance: Uuid,
    username: String,
    forwarder: tokio::task::JoinHandle<()>,
}

async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Writer task: everything destined for this client funnels through one
    // channel so direct replies and forwarded events cannot interleave
    // mid-frame.
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4().to_string();
    let mut membership: Option<Membership> = None;

    debug!(%connection_id, "websocket connected");

    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let message: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                send(&out_tx, &ServerMessage::Error {
                    message: format!("unrecognized message: {e}"),
                });
                continue;
            }
        };

        match message {
            ClientMessage::JoinSession {
                session_id,
                username,
                avatar,
            } => {
                if membership.is_some() {
                    send(&out_tx, &ServerMessage::Error {
                        message: "already joined a session on this connection".into(),
                    });
                    continue;
                }

                let mut user = User::new(connection_id.clone(), username.clone());
                if let Some(avatar) = avatar {
                    user = user.with_avatar(avatar);
                }

                match state.registry.join(&session_id, user).await {
                    Ok(joined) => {
                        let forwarder = spawn_forwarder(joined.events, out_tx.clone());
                        send(&out_tx, &ServerMessage::SessionState {
                            session: joined.snapshot,
                        });
                        membership = Some(Membership {
                            session_id: session_id.clone(),
                            instance: joined.instance,
                            username,
                            forwarder,
                        });
                        info!(%connection_id, %session_id, "user joined session");
                    }
                    Err(e) => send(&out_tx, &ServerMessage::Error {
                        message: e.to_string(),
                    }),
                }
            }

            ClientMessage::SubmitCode {
                code,
                validation_type,
                language,
                heightened_scrutiny,
                request_report_delivery,
                report_recipient,
            } => {
                let Some(ref m) = membership else {
                    send(&out_tx, &ServerMessage::Error {
                        message: "join a session before submitting code".into(),
                    });
                    continue;
                };
                if code.trim().is_empty() {
                    send(&out_tx, &ServerMessage::Error {
                        message: "no code provided".into(),
                    });
                    continue;
                }

                let mut submission = Submission::new(connection_id.clone(), code, validation_type)
                    .with_language(language)
                    .with_heightened_scrutiny(heightened_scrutiny)
                    .with_report_delivery(request_report_delivery);
                submission.start_validating();

                if let Err(e) = state
                    .registry
                    .record_submission(&m.session_id, m.instance, submission.clone())
                    .await
                {
                    send(&out_tx, &ServerMessage::Error {
                        message: e.to_string(),
                    });
                    continue;
                }

                let started = SessionEvent::ValidationStarted {
                    session_id: m.session_id.clone(),
                    submission_id: submission.id.clone(),
                    validation_type,
                    agents: state.orchestrator.planned_agents(validation_type),
                    timestamp: chrono::Utc::now(),
                };
                let _ = state
                    .registry
                    .publish(&m.session_id, m.instance, started)
                    .await;

                spawn_validation(
                    state.clone(),
                    m.session_id.clone(),
                    m.instance,
                    submission,
                    report_recipient,
                );
            }

            ClientMessage::Typing => {
                if let Some(ref m) = membership {
                    let event = SessionEvent::Typing {
                        session_id: m.session_id.clone(),
                        connection_id: connection_id.clone(),
                        username: m.username.clone(),
                        timestamp: chrono::Utc::now(),
                    };
                    let _ = state.registry.publish(&m.session_id, m.instance, event).await;
                }
            }

            ClientMessage::LeaveSession => {
                if let Some(m) = membership.take() {
                    m.forwarder.abort();
                    let _ = state.registry.leave(&m.session_id, &connection_id).await;
                    info!(%connection_id, session_id = %m.session_id, "user left session");
                }
            }
        }
    }

    if let Some(m) = membership.take() {
        m.forwarder.abort();
        if let Err(e) = state.registry.leave(&m.session_id, &connection_id).await {
            debug!(%connection_id, "leave on disconnect: {e}");
        }
        info!(%connection_id, session_id = %m.session_id, "disconnected");
    }

    writer.abort();
}

/// Forward the session broadcast stream to this client until it lags out,
/// the session closes, or the connection goes away.
fn spawn_forwarder(
    mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
    out_tx: mpsc::UnboundedSender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if out_tx.send(text).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "slow websocket consumer dropped events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Run the validation off the socket loop so concurrent submissions in one
/// session proceed independently. A result whose session instance is gone
/// is discarded, never broadcast elsewhere.
fn spawn_validation(
    state: Arc<AppState>,
    session_id: String,
    instance: Uuid,
    submission: Submission,
    report_recipient: Option<String>,
) {
    tokio::spawn(async move {
        let orchestrator = state.orchestrator.clone();
        let task_submission = submission.clone();
        let outcome =
            tokio::spawn(async move { orchestrator.validate(&task_submission).await }).await;

        match outcome {
            Ok(result) => {
                match state
                    .registry
                    .record_result(&session_id, instance, result.clone())
                    .await
                {
                    Ok(()) => {
                        if submission.request_report_delivery {
                            deliver_report(&state, &submission, &result, report_recipient).await;
                        }
                    }
                    Err(e) => {
                        info!(
                            submission_id = %submission.id,
                            %session_id,
                            "discarding result: {e}"
                        );
                    }
                }
            }
            Err(join_err) => {
                warn!(
                    submission_id = %submission.id,
                    %session_id,
                    "validation task failed: {join_err}"
                );
                let _ = state
                    .registry
                    .record_failure(
                        &session_id,
                        instance,
                        &submission.id,
                        "validation aborted unexpectedly",
                    )
                    .await;
            }
        }
    });
}

async fn deliver_report(
    state: &AppState,
    submission: &Submission,
    result: &consensus::ConsensusResult,
    recipient: Option<String>,
) {
    let Some(recipient) = recipient else {
        debug!(
            submission_id = %submission.id,
            "report requested without a recipient; skipping"
        );
        return;
    };

    if let Err(e) = state
        .report_sink
        .deliver(&recipient, submission, result)
        .await
    {
        warn!(
            submission_id = %submission.id,
            %recipient,
            "report delivery failed: {e}"
        );
    }
}

fn send(out_tx: &mpsc::UnboundedSender<String>, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = out_tx.send(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_join_parse() {
        let raw = r#"{"type": "join_session", "session_id": "demo-1", "username": "alice"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::JoinSession { session_id, username, avatar: None }
                if session_id == "demo-1" && username == "alice"
        ));
    }

    #[test]
    fn test_client_message_submit_defaults() {
        let raw = r#"{"type": "submit_code", "code": "x = 1", "validation_type": "crypto_audit"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        match parsed {
            ClientMessage::SubmitCode {
                code,
                validation_type,
                language,
                heightened_scrutiny,
                request_report_delivery,
                report_recipient,
            } => {
                assert_eq!(code, "x = 1");
                assert_eq!(validation_type, ValidationType::CryptoAudit);
                assert_eq!(language, "python");
                assert!(!heightened_scrutiny);
                assert!(!request_report_delivery);
                assert!(report_recipient.is_none());
            }
            other => panic!("unexpected parse {other:?}"),
        }
    }

    #[test]
    fn test_unknown_message_rejected() {
        let raw = r#"{"type": "launch_missiles"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn test_server_error_wire_shape() {
        let msg = ServerMessage::Error {
            message: "boom".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
