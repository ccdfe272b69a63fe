//! Consensus orchestrator: fan-out, quorum, weighted aggregation
//!
//! Stateless per call. Every configured agent for the submission's chain is
//! dispatched concurrently with an independent timeout; failures are logged
//! and dropped, never retried, and never abort the submission. Below quorum
//! the orchestrator answers from the fallback cache instead of synthesizing
//! a verdict from partial data.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agents::{AgentError, AgentId, SharedAgent};
use crate::classifier::IssueClassifier;
use crate::config::ValidationConfig;
use crate::fallback::FallbackCache;
use crate::metrics;
use crate::types::{AgentResult, ConsensusResult, Submission, ValidationType};

/// Shared reference to the orchestrator
pub type SharedOrchestrator = Arc<ConsensusOrchestrator>;

/// Aggregates independent agent judgments into one consensus verdict
pub struct ConsensusOrchestrator {
    config: Arc<ValidationConfig>,
    agents: HashMap<AgentId, SharedAgent>,
    fallback: FallbackCache,
}

impl ConsensusOrchestrator {
    /// Build an orchestrator over the startup agent manifest
    pub fn new(config: Arc<ValidationConfig>, agents: Vec<SharedAgent>) -> Self {
        let agents = agents.into_iter().map(|a| (a.id(), a)).collect();
        Self {
            config,
            agents,
            fallback: FallbackCache::new(),
        }
    }

    /// Create a shared reference to this orchestrator
    pub fn shared(self) -> SharedOrchestrator {
        Arc::new(self)
    }

    /// The agents that will run for a validation type, in chain order
    ///
    /// Chain entries without a configured adapter are skipped; the chain
    /// declares intent, the manifest declares availability.
    pub fn planned_agents(&self, validation_type: ValidationType) -> Vec<AgentId> {
        self.config
            .chain_for(validation_type)
            .agents
            .iter()
            .copied()
            .filter(|id| self.agents.contains_key(id))
            .collect()
    }

    /// Validate a submission and produce its single consensus result
    pub async fn validate(&self, submission: &Submission) -> ConsensusResult {
        let planned = self.planned_agents(submission.validation_type);

        info!(
            submission_id = %submission.id,
            validation_type = %submission.validation_type,
            agents = planned.len(),
            "dispatching validation"
        );

        let results = self.fan_out(submission, &planned).await;

        if results.len() < self.config.quorum {
            warn!(
                submission_id = %submission.id,
                succeeded = results.len(),
                quorum = self.config.quorum,
                "quorum not met; answering from fallback cache"
            );
            return self.fallback.synthesize(submission, &self.config);
        }

        self.aggregate(submission, &planned, results)
    }

    /// Dispatch all planned agents concurrently and keep the survivors
    async fn fan_out(&self, submission: &Submission, planned: &[AgentId]) -> Vec<AgentResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_agents));
        let submission = Arc::new(submission.clone());
        let timeout = self.config.agent_timeout();
        let mut join_set: JoinSet<Result<AgentResult, AgentError>> = JoinSet::new();

        for id in planned {
            let Some(agent) = self.agents.get(id).cloned() else {
                continue;
            };
            let semaphore = semaphore.clone();
            let submission = submission.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                match tokio::time::timeout(timeout, agent.invoke(&submission)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout {
                        agent: agent.id(),
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(result)) => {
                    debug!(
                        submission_id = %submission.id,
                        agent = %result.agent,
                        confidence = result.confidence,
                        "agent succeeded"
                    );
                    results.push(result);
                }
                Ok(Err(err)) => {
                    warn!(
                        submission_id = %submission.id,
                        agent = %err.agent(),
                        kind = err.kind(),
                        "agent dropped from aggregation: {err}"
                    );
                }
                Err(join_err) => {
                    warn!(
                        submission_id = %submission.id,
                        "agent task panicked: {join_err}"
                    );
                }
            }
        }

        results
    }

    fn aggregate(
        &self,
        submission: &Submission,
        planned: &[AgentId],
        mut results: Vec<AgentResult>,
    ) -> ConsensusResult {
        // Stable display order regardless of completion order.
        results.sort_by_key(|r| planned.iter().position(|id| *id == r.agent));

        let weight_sum: f64 = results.iter().map(|r| r.agent.weight()).sum();
        let weighted: f64 = results
            .iter()
            .map(|r| r.confidence * r.agent.weight())
            .sum::<f64>()
            / weight_sum;

        let lo = results
            .iter()
            .map(|r| r.confidence)
            .fold(f64::INFINITY, f64::min);
        let hi = results
            .iter()
            .map(|r| r.confidence)
            .fold(f64::NEG_INFINITY, f64::max);
        let confidence = weighted.clamp(lo, hi);

        let chain = self.config.chain_for(submission.validation_type);
        let classifier = IssueClassifier::for_chain(chain, self.config.fuzzy_threshold);
        let classified = classifier.classify(&results);

        let thresholds = self.config.thresholds_for(submission.validation_type);
        let rating = thresholds.rating(confidence, submission.heightened_scrutiny);

        let issue_texts = classified.issue_texts();
        let agents_used: Vec<AgentId> = results.iter().map(|r| r.agent).collect();

        info!(
            submission_id = %submission.id,
            confidence,
            rating = %rating,
            issues = issue_texts.len(),
            priority = classified.priority_texts().len(),
            "consensus reached"
        );

        ConsensusResult {
            submission_id: submission.id.clone(),
            overall_rating: rating,
            consensus_confidence: confidence,
            enhanced_metrics: metrics::compute(
                &submission.code,
                &issue_texts,
                &classified.suggestions,
                confidence,
            ),
            issues_found: issue_texts,
            priority_issues: classified.priority_texts(),
            suggestions: classified.suggestions,
            agents_used,
            agent_details: results,
            offline: false,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentAdapter, AgentInvokeResult};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Scripted adapter: fixed confidence/issues, optional delay or failure
    struct ScriptedAgent {
        id: AgentId,
        confidence: f64,
        issues: Vec<String>,
        delay: Duration,
        fail: bool,
    }

    impl ScriptedAgent {
        fn ok(id: AgentId, confidence: f64) -> Self {
            Self {
                id,
                confidence,
                issues: Vec::new(),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn failing(id: AgentId) -> Self {
            Self {
                id,
                confidence: 0.0,
                issues: Vec::new(),
                delay: Duration::ZERO,
                fail: true,
            }
        }

        fn with_issues(mut self, issues: &[&str]) -> Self {
            self.issues = issues.iter().map(|s| s.to_string()).collect();
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl AgentAdapter for ScriptedAgent {
        fn id(&self) -> AgentId {
            self.id
        }

        async fn invoke(&self, _submission: &Submission) -> AgentInvokeResult {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AgentError::Transport {
                    agent: self.id,
                    reason: "scripted failure".into(),
                });
            }
            Ok(AgentResult::new(self.id, self.confidence, 5)
                .with_issues(self.issues.clone())
                .with_rationale("scripted"))
        }
    }

    fn orchestrator(agents: Vec<SharedAgent>) -> ConsensusOrchestrator {
        ConsensusOrchestrator::new(Arc::new(ValidationConfig::default()), agents)
    }

    fn submission(vt: ValidationType) -> Submission {
        Submission::new("conn-1", "def add(a,b): return a+b", vt)
    }

    #[tokio::test]
    async fn test_equal_weight_consensus_scenario() {
        // Claude, HrmReasoning, and MathematicalValidator share weight 1.0,
        // so 0.9 / 0.85 / 0.7 averages to 0.8167 and lands in the good band.
        let mut config = ValidationConfig::default();
        config
            .chains
            .get_mut(&ValidationType::GeneralValidation)
            .unwrap()
            .agents = vec![
            AgentId::Claude,
            AgentId::HrmReasoning,
            AgentId::MathematicalValidator,
        ];

        let orch = ConsensusOrchestrator::new(
            Arc::new(config),
            vec![
                Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.9)),
                Arc::new(ScriptedAgent::ok(AgentId::HrmReasoning, 0.85)),
                Arc::new(ScriptedAgent::ok(AgentId::MathematicalValidator, 0.7)),
            ],
        );

        let sub = submission(ValidationType::GeneralValidation);
        let result = orch.validate(&sub).await;

        assert!(!result.offline);
        assert!((result.consensus_confidence - 0.8167).abs() < 1e-3);
        assert_eq!(result.overall_rating, crate::types::Rating::Good);
    }

    #[tokio::test]
    async fn test_confidence_within_agent_bounds() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedAgent::ok(AgentId::DeepSeek, 0.6)),
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.95)),
            Arc::new(ScriptedAgent::ok(AgentId::PerformanceAnalyzer, 0.8)),
        ]);

        let result = orch.validate(&submission(ValidationType::GeneralValidation)).await;
        assert!(result.consensus_confidence >= 0.6);
        assert!(result.consensus_confidence <= 0.95);
    }

    #[tokio::test]
    async fn test_quorum_miss_falls_back_offline() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.9)),
            Arc::new(ScriptedAgent::failing(AgentId::DeepSeek)),
            Arc::new(ScriptedAgent::failing(AgentId::PerformanceAnalyzer)),
        ]);

        let sub = submission(ValidationType::GeneralValidation);
        let result = orch.validate(&sub).await;

        assert!(result.offline);
        assert!(result.agents_used.is_empty());

        let config = ValidationConfig::default();
        let (lo, hi) = config
            .chain_for(ValidationType::GeneralValidation)
            .fallback_confidence;
        assert!(result.consensus_confidence >= lo && result.consensus_confidence <= hi);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_agent_timed_out_and_dropped() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedAgent::ok(AgentId::DeepSeek, 0.8)),
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.9)),
            Arc::new(
                ScriptedAgent::ok(AgentId::PerformanceAnalyzer, 0.99)
                    .with_delay(Duration::from_secs(120)),
            ),
        ]);

        let result = orch.validate(&submission(ValidationType::GeneralValidation)).await;

        assert!(!result.offline);
        assert_eq!(result.agents_used.len(), 2);
        assert!(!result.agents_used.contains(&AgentId::PerformanceAnalyzer));
    }

    #[tokio::test]
    async fn test_failed_agents_never_listed() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedAgent::ok(AgentId::DeepSeek, 0.8)),
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.85)),
            Arc::new(ScriptedAgent::failing(AgentId::PerformanceAnalyzer)),
        ]);

        let result = orch.validate(&submission(ValidationType::GeneralValidation)).await;
        assert_eq!(
            result.agents_used,
            vec![AgentId::DeepSeek, AgentId::Claude]
        );
    }

    #[tokio::test]
    async fn test_shared_issue_promoted_to_priority() {
        let orch = orchestrator(vec![
            Arc::new(
                ScriptedAgent::ok(AgentId::DeepSeek, 0.7).with_issues(&["Unbounded recursion"]),
            ),
            Arc::new(
                ScriptedAgent::ok(AgentId::Claude, 0.75).with_issues(&["unbounded recursion"]),
            ),
        ]);

        let result = orch.validate(&submission(ValidationType::GeneralValidation)).await;
        assert_eq!(result.issues_found.len(), 1);
        assert_eq!(result.priority_issues.len(), 1);
    }

    #[tokio::test]
    async fn test_heightened_scrutiny_tightens_rating() {
        let agents: Vec<SharedAgent> = vec![
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.87)),
            Arc::new(ScriptedAgent::ok(AgentId::HrmReasoning, 0.87)),
        ];

        let relaxed = orchestrator(agents.iter().cloned().collect())
            .validate(&submission(ValidationType::CryptoAudit))
            .await;
        assert_eq!(relaxed.overall_rating, crate::types::Rating::VeryGood);

        let strict_sub =
            submission(ValidationType::CryptoAudit).with_heightened_scrutiny(true);
        let strict = orchestrator(agents).validate(&strict_sub).await;
        assert_eq!(strict.overall_rating, crate::types::Rating::Good);
    }

    #[test]
    fn test_planned_agents_filters_missing_adapters() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedAgent::ok(AgentId::DeepSeek, 0.8)),
            Arc::new(ScriptedAgent::ok(AgentId::Claude, 0.8)),
        ]);

        let planned = orch.planned_agents(ValidationType::GeneralValidation);
        assert_eq!(planned, vec![AgentId::DeepSeek, AgentId::Claude]);
    }
}
