//! Administrative read surface and liveness probe

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{session_id}", get(session_detail))
        .route("/health", get(health))
        .with_state(state)
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    Json(state.registry.list_sessions().await).into_response()
}

async fn session_detail(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.registry.snapshot(&session_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    connected_users: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let (active_sessions, connected_users) = state.registry.counts().await;
    Json(Health {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        active_sessions,
        connected_users,
    })
}
