//! Shared fixtures for integration tests

use std::sync::Arc;

use async_trait::async_trait;

use consensus::agents::AgentInvokeResult;
use consensus::{
    AgentAdapter, AgentError, AgentId, AgentResult, SharedAgent, Submission,
};

/// Scripted analysis backend with a fixed verdict
pub struct ScriptedAgent {
    pub id: AgentId,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub fail: bool,
}

impl ScriptedAgent {
    pub fn ok(id: AgentId, confidence: f64) -> Self {
        Self {
            id,
            confidence,
            issues: Vec::new(),
            fail: false,
        }
    }

    pub fn failing(id: AgentId) -> Self {
        Self {
            fail: true,
            ..Self::ok(id, 0.0)
        }
    }

    pub fn with_issues(mut self, issues: &[&str]) -> Self {
        self.issues = issues.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn shared(self) -> SharedAgent {
        Arc::new(self)
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn invoke(&self, _submission: &Submission) -> AgentInvokeResult {
        if self.fail {
            return Err(AgentError::Transport {
                agent: self.id,
                reason: "scripted outage".into(),
            });
        }
        Ok(AgentResult::new(self.id, self.confidence, 3)
            .with_issues(self.issues.clone())
            .with_rationale("scripted verdict"))
    }
}
