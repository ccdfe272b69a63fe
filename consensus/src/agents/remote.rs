//! Remote analysis backend adapter
//!
//! Speaks an OpenAI-style chat-completions API. The adapter owns its
//! timeout, normalizes the reply into an [`AgentResult`], and maps every
//! failure mode onto the [`AgentError`] taxonomy so the orchestrator can
//! drop it from aggregation without special cases.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AgentAdapter, AgentError, AgentId, AgentInvokeResult};
use crate::config::ValidationConfig;
use crate::types::{AgentResult, Submission};

/// Adapter for one remote model behind the shared chat-completions endpoint
pub struct RemoteAgent {
    id: AgentId,
    config: Arc<ValidationConfig>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// The JSON verdict the analysis prompt asks the model to produce
#[derive(Debug, Deserialize)]
struct Verdict {
    confidence: Option<f64>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    rationale: String,
}

impl RemoteAgent {
    /// Build an adapter for `id` against the configured endpoint
    pub fn new(id: AgentId, config: Arc<ValidationConfig>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(config.agent_timeout())
            .build()
            .map_err(|e| AgentError::Transport {
                agent: id,
                reason: format!("client build failed: {e}"),
            })?;

        Ok(Self { id, config, client })
    }

    fn build_prompt(&self, submission: &Submission) -> String {
        let chain = self.config.chain_for(submission.validation_type);

        let mut prompt = format!(
            "Analyze this {language} code. Focus areas: {focus}.\n\n\
             ```\n{code}\n```\n\n\
             Return a JSON object with:\n\
             - confidence (0.0-1.0, your confidence that the code is sound)\n\
             - issues (list of specific problems found)\n\
             - suggestions (list of concrete improvements)\n\
             - rationale (one paragraph explaining your verdict)\n\n\
             Format: {{\"confidence\": 0.0, \"issues\": [], \"suggestions\": [], \"rationale\": \"\"}}",
            language = submission.language,
            focus = chain.focus,
            code = submission.code,
        );

        if submission.heightened_scrutiny {
            prompt.push_str(
                "\n\nApply heightened scrutiny: treat any ambiguity as an issue and \
                 report every finding, however minor.",
            );
        }

        prompt
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a {specialties} reviewer on a multi-agent code validation panel. \
             Report findings as plain statements, one issue per list entry.",
            specialties = self.id.specialties().join("/"),
        )
    }

    /// Pull the verdict out of the model reply
    ///
    /// Models wrap the JSON in prose often enough that we extract the first
    /// balanced object; a bracketed `[confidence: 0.85]` marker is accepted
    /// as a last resort.
    fn parse_verdict(&self, content: &str) -> Result<Verdict, AgentError> {
        if let Some(raw) = extract_json_object(content) {
            if let Ok(verdict) = serde_json::from_str::<Verdict>(raw) {
                return Ok(verdict);
            }
        }

        if let Some(confidence) = extract_bracketed_confidence(content) {
            return Ok(Verdict {
                confidence: Some(confidence),
                issues: Vec::new(),
                suggestions: Vec::new(),
                rationale: content.trim().to_string(),
            });
        }

        Err(AgentError::MalformedResponse {
            agent: self.id,
            reason: "no JSON verdict or confidence marker in reply".to_string(),
        })
    }
}

#[async_trait]
impl AgentAdapter for RemoteAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn invoke(&self, submission: &Submission) -> AgentInvokeResult {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.id.api_name().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: self.build_prompt(submission),
                },
            ],
            max_tokens: self.config.endpoint.max_tokens,
            temperature: self.config.endpoint.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint.url)
            .bearer_auth(&self.config.endpoint.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        agent: self.id,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                } else {
                    AgentError::Transport {
                        agent: self.id,
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AgentError::Transport {
                agent: self.id,
                reason: format!("HTTP {status}"),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AgentError::MalformedResponse {
                agent: self.id,
                reason: e.to_string(),
            }
        })?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AgentError::MalformedResponse {
                agent: self.id,
                reason: "empty choices in chat response".to_string(),
            })?;

        let verdict = self.parse_verdict(&content)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            agent = %self.id,
            submission_id = %submission.id,
            duration_ms,
            issues = verdict.issues.len(),
            "remote agent completed"
        );

        Ok(
            AgentResult::new(self.id, verdict.confidence.unwrap_or(0.5), duration_ms)
                .with_issues(verdict.issues)
                .with_suggestions(verdict.suggestions)
                .with_rationale(verdict.rationale),
        )
    }
}

/// First `{...}` block in the text, balanced over nested braces
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `[confidence: 0.85]` marker used by models that skip the JSON format
fn extract_bracketed_confidence(text: &str) -> Option<f64> {
    let start = text.find("[confidence:")?;
    let rest = &text[start + "[confidence:".len()..];
    let end = rest.find(']')?;
    rest[..end]
        .trim()
        .parse::<f64>()
        .ok()
        .map(|c| c.clamp(0.0, 1.0))
}
