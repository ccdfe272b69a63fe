//! Local dangerous-pattern scanning agent
//!
//! A deterministic, always-available panel member. It never touches the
//! network, so it also keeps the quorum alive when remote backends are
//! degraded.

use std::time::Instant;

use async_trait::async_trait;
use regex::RegexBuilder;
use tracing::debug;

use super::{AgentAdapter, AgentId, AgentInvokeResult};
use crate::types::{AgentResult, Submission};

/// One dangerous construct: detection regex plus the issue it raises
struct DangerousPattern {
    regex: regex::Regex,
    issue: &'static str,
    suggestion: &'static str,
}

/// Deterministic regex-based analysis backend
pub struct PatternAgent {
    patterns: Vec<DangerousPattern>,
}

const PATTERN_TABLE: &[(&str, &str, &str)] = &[
    (
        r"eval\s*\(",
        "Code injection risk via eval()",
        "Replace eval() with explicit parsing of the expected input",
    ),
    (
        r"exec\s*\(",
        "Arbitrary code execution via exec()",
        "Remove dynamic code execution or sandbox it strictly",
    ),
    (
        r"os\.system\s*\(",
        "Shell command injection risk",
        "Use an argument-vector process API instead of shell interpolation",
    ),
    (
        r"subprocess\.(call|run|Popen)",
        "Command injection vulnerability",
        "Pass arguments as a list and never enable shell=True with user input",
    ),
    (
        r#"(password|secret|key|token)\s*=\s*["'][^"']+["']"#,
        "Hardcoded credentials",
        "Move credentials to environment variables or a secret store",
    ),
    (
        r"SELECT\s+.*\s+FROM\s+.*WHERE.*[\+\%]",
        "Potential SQL injection",
        "Use parameterized queries for all user-controlled values",
    ),
    (
        r"<script\s*>",
        "XSS vulnerability in HTML output",
        "Escape user content before interpolating into markup",
    ),
    (
        r"pickle\.loads?\s*\(",
        "Deserialization vulnerability",
        "Deserialize untrusted data with a schema-checked format instead",
    ),
];

/// Confidence lost per detected pattern
const CONFIDENCE_STEP: f64 = 0.15;

impl PatternAgent {
    pub fn new() -> Self {
        let patterns = PATTERN_TABLE
            .iter()
            .map(|&(pattern, issue, suggestion)| DangerousPattern {
                regex: RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("static pattern table is valid"),
                issue,
                suggestion,
            })
            .collect();

        Self { patterns }
    }
}

impl Default for PatternAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for PatternAgent {
    fn id(&self) -> AgentId {
        AgentId::PatternMatcher
    }

    async fn invoke(&self, submission: &Submission) -> AgentInvokeResult {
        let start = Instant::now();

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        for pattern in &self.patterns {
            if pattern.regex.is_match(&submission.code) {
                issues.push(pattern.issue.to_string());
                suggestions.push(pattern.suggestion.to_string());
            }
        }

        let hits = issues.len();
        let confidence = (1.0 - hits as f64 * CONFIDENCE_STEP).max(0.1);
        let rationale = if hits == 0 {
            "Static scan found no dangerous constructs.".to_string()
        } else {
            format!("Static scan matched {hits} dangerous construct(s).")
        };

        debug!(
            submission_id = %submission.id,
            hits,
            confidence,
            "pattern scan complete"
        );

        Ok(
            AgentResult::new(AgentId::PatternMatcher, confidence, {
                start.elapsed().as_millis() as u64
            })
            .with_issues(issues)
            .with_suggestions(suggestions)
            .with_rationale(rationale),
        )
    }
}
