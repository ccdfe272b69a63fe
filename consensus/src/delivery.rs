//! Report delivery sink
//!
//! Validation reports can optionally be pushed to an external delivery
//! service after a result is recorded. The sink is a narrow seam: delivery
//! failures are logged with the submission id and never roll back or
//! invalidate the already-computed result.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::types::{ConsensusResult, Rating, Submission};

/// Error type for report delivery
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery transport failure: {0}")]
    Transport(String),

    #[error("delivery rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Result type for report delivery
pub type DeliveryResult = Result<(), DeliveryError>;

/// Outbound report channel
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver a rendered validation report to a recipient
    async fn deliver(
        &self,
        recipient: &str,
        submission: &Submission,
        result: &ConsensusResult,
    ) -> DeliveryResult;
}

/// Sink that logs instead of sending; default when no API key is configured
pub struct NoopReportSink;

#[async_trait]
impl ReportSink for NoopReportSink {
    async fn deliver(
        &self,
        recipient: &str,
        submission: &Submission,
        _result: &ConsensusResult,
    ) -> DeliveryResult {
        info!(
            submission_id = %submission.id,
            recipient,
            "report delivery disabled; skipping"
        );
        Ok(())
    }
}

/// HTTP sink posting a plain-text report to a transactional email API
pub struct HttpReportSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

#[derive(Serialize)]
struct OutboundReport<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
}

impl HttpReportSink {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            sender: sender.into(),
        }
    }

    fn subject(result: &ConsensusResult) -> String {
        let marker = match result.overall_rating {
            Rating::NeedsImprovement => "ACTION NEEDED",
            Rating::Satisfactory => "REVIEW",
            Rating::Good | Rating::VeryGood => "PASSED",
        };
        format!(
            "[{marker}] Code validation {rating} (confidence {confidence:.2})",
            rating = result.overall_rating,
            confidence = result.consensus_confidence,
        )
    }

    fn render(submission: &Submission, result: &ConsensusResult) -> String {
        let mut body = format!(
            "Validation report\n\
             =================\n\
             Submission: {id}\n\
             Type: {vt}\n\
             Rating: {rating}\n\
             Confidence: {confidence:.2}\n\
             Offline: {offline}\n\n\
             Issues:\n",
            id = submission.id,
            vt = submission.validation_type,
            rating = result.overall_rating,
            confidence = result.consensus_confidence,
            offline = result.offline,
        );

        if result.issues_found.is_empty() {
            body.push_str("  (none)\n");
        }
        for (i, issue) in result.issues_found.iter().enumerate() {
            let flag = if result.priority_issues.contains(issue) {
                " [priority]"
            } else {
                ""
            };
            body.push_str(&format!("  {}. {issue}{flag}\n", i + 1));
        }

        if !result.suggestions.is_empty() {
            body.push_str("\nSuggestions:\n");
            for suggestion in &result.suggestions {
                body.push_str(&format!("  - {suggestion}\n"));
            }
        }

        body
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn deliver(
        &self,
        recipient: &str,
        submission: &Submission,
        result: &ConsensusResult,
    ) -> DeliveryResult {
        let report = OutboundReport {
            from: &self.sender,
            to: recipient,
            subject: Self::subject(result),
            text: Self::render(submission, result),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&report)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        info!(
            submission_id = %submission.id,
            recipient,
            "validation report delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnhancedMetrics, ValidationType};
    use chrono::Utc;

    fn result_fixture(rating: Rating) -> ConsensusResult {
        ConsensusResult {
            submission_id: "sub-1".into(),
            overall_rating: rating,
            consensus_confidence: 0.8,
            issues_found: vec!["Hardcoded credentials".into(), "Missing docs".into()],
            priority_issues: vec!["Hardcoded credentials".into()],
            suggestions: vec!["Use a secret store".into()],
            agents_used: Vec::new(),
            agent_details: Vec::new(),
            enhanced_metrics: EnhancedMetrics {
                complexity_score: 0.2,
                security_score: 0.5,
                maintainability_score: 0.7,
                weighted_confidence: 0.8,
            },
            offline: false,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_subject_reflects_rating() {
        assert!(HttpReportSink::subject(&result_fixture(Rating::NeedsImprovement))
            .contains("ACTION NEEDED"));
        assert!(HttpReportSink::subject(&result_fixture(Rating::VeryGood)).contains("PASSED"));
    }

    #[test]
    fn test_render_marks_priority_issues() {
        let sub = Submission::new("conn-1", "x = 1", ValidationType::GeneralValidation);
        let body = HttpReportSink::render(&sub, &result_fixture(Rating::Satisfactory));

        assert!(body.contains("Hardcoded credentials [priority]"));
        assert!(body.contains("Missing docs\n"));
        assert!(body.contains("Use a secret store"));
    }

    #[tokio::test]
    async fn test_noop_sink_always_succeeds() {
        let sub = Submission::new("conn-1", "x = 1", ValidationType::GeneralValidation);
        let result = result_fixture(Rating::Good);
        assert!(NoopReportSink
            .deliver("user@example.com", &sub, &result)
            .await
            .is_ok());
    }
}
