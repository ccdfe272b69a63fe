//! One-shot sessionless validation endpoint
//!
//! Mirrors the websocket submit flow for clients that only want a single
//! verdict, without joining a collaborative session.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use consensus::{ConsensusResult, Submission, ValidationType};

use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/validate", post(validate))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    code: String,
    validation_type: ValidationType,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    heightened_scrutiny: bool,
    #[serde(default)]
    report_recipient: Option<String>,
}

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    validation_id: String,
    timestamp: chrono::DateTime<Utc>,
    validation_result: ConsensusResult,
}

async fn validate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateRequest>,
) -> Response {
    if request.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "no code provided" })),
        )
            .into_response();
    }

    let mut submission = Submission::new("one-shot", request.code, request.validation_type)
        .with_language(request.language)
        .with_heightened_scrutiny(request.heightened_scrutiny)
        .with_report_delivery(request.report_recipient.is_some());
    submission.start_validating();

    let result = state.orchestrator.validate(&submission).await;

    if let Some(recipient) = request.report_recipient {
        if let Err(e) = state
            .report_sink
            .deliver(&recipient, &submission, &result)
            .await
        {
            warn!(
                submission_id = %submission.id,
                %recipient,
                "report delivery failed: {e}"
            );
        }
    }

    Json(ValidateResponse {
        validation_id: submission.id,
        timestamp: Utc::now(),
        validation_result: result,
    })
    .into_response()
}
