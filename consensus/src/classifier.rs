//! Issue classification: dedup and priority promotion
//!
//! Agents describe the same defect in slightly different words. The
//! classifier folds near-duplicates together, remembers which agents raised
//! each finding, and promotes findings to priority severity when multiple
//! agents agree or when a critical-vocabulary term matches. Severity ties
//! break toward priority.
//!
//! Critical vocabulary is supplied per validation type through
//! [`ChainConfig`], so chains tune their own heuristics without touching the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::agents::AgentId;
use crate::config::ChainConfig;
use crate::types::AgentResult;

/// Severity of a classified issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Priority,
    Regular,
}

/// One deduplicated finding with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedIssue {
    /// First-seen wording, kept for display
    pub text: String,
    /// Normalized form used for matching
    pub normalized: String,
    /// Assigned severity
    pub severity: Severity,
    /// Agents that raised this issue (empty for cached fallback findings)
    pub agents: BTreeSet<AgentId>,
}

/// Classification output for one submission
#[derive(Debug, Clone, Default)]
pub struct Classified {
    /// All deduplicated issues, original order of first appearance
    pub issues: Vec<ClassifiedIssue>,
    /// Deduplicated suggestions, original order of first appearance
    pub suggestions: Vec<String>,
}

impl Classified {
    /// Display texts of every issue
    pub fn issue_texts(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.text.clone()).collect()
    }

    /// Display texts of the priority subset
    pub fn priority_texts(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Priority)
            .map(|i| i.text.clone())
            .collect()
    }
}

/// Pluggable dedup-and-rank pass over agent findings
#[derive(Debug, Clone)]
pub struct IssueClassifier {
    critical_vocabulary: Vec<String>,
    fuzzy_threshold: f64,
}

impl IssueClassifier {
    /// Build a classifier for one chain
    pub fn for_chain(chain: &ChainConfig, fuzzy_threshold: f64) -> Self {
        Self {
            critical_vocabulary: chain
                .critical_vocabulary
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            fuzzy_threshold,
        }
    }

    /// Classify the concatenated findings of all succeeding agents
    pub fn classify(&self, results: &[AgentResult]) -> Classified {
        let raised = results
            .iter()
            .flat_map(|r| r.issues.iter().map(move |i| (i.clone(), Some(r.agent))))
            .collect::<Vec<_>>();

        let suggestions = results
            .iter()
            .flat_map(|r| r.suggestions.iter().cloned())
            .collect::<Vec<_>>();

        self.classify_raised(raised, suggestions)
    }

    /// Lower-level entry point used by the fallback cache, where findings
    /// have no agent attribution
    pub fn classify_raised(
        &self,
        raised: Vec<(String, Option<AgentId>)>,
        suggestions: Vec<String>,
    ) -> Classified {
        let mut issues: Vec<ClassifiedIssue> = Vec::new();

        for (text, agent) in raised {
            let normalized = normalize(&text);
            if normalized.is_empty() {
                continue;
            }

            let existing = issues
                .iter_mut()
                .find(|i| self.is_duplicate(&i.normalized, &normalized));

            match existing {
                Some(issue) => {
                    if let Some(agent) = agent {
                        issue.agents.insert(agent);
                    }
                }
                None => {
                    let mut agents = BTreeSet::new();
                    if let Some(agent) = agent {
                        agents.insert(agent);
                    }
                    issues.push(ClassifiedIssue {
                        text,
                        normalized,
                        severity: Severity::Regular,
                        agents,
                    });
                }
            }
        }

        for issue in &mut issues {
            issue.severity = self.severity_of(issue);
        }

        let mut seen = BTreeSet::new();
        let suggestions = suggestions
            .into_iter()
            .filter(|s| seen.insert(normalize(s)))
            .collect();

        Classified { issues, suggestions }
    }

    fn severity_of(&self, issue: &ClassifiedIssue) -> Severity {
        if issue.agents.len() >= 2 {
            return Severity::Priority;
        }
        if self
            .critical_vocabulary
            .iter()
            .any(|term| issue.normalized.contains(term))
        {
            return Severity::Priority;
        }
        Severity::Regular
    }

    fn is_duplicate(&self, a: &str, b: &str) -> bool {
        a == b || token_jaccard(a, b) >= self.fuzzy_threshold
    }
}

/// Case-folded, whitespace-collapsed, trailing punctuation stripped
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', ';'])
        .to_string()
}

/// Token-set Jaccard similarity between two normalized strings
fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split(' ').collect();
    let set_b: BTreeSet<&str> = b.split(' ').collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::types::ValidationType;

    fn classifier(vt: ValidationType) -> IssueClassifier {
        let config = ValidationConfig::default();
        IssueClassifier::for_chain(config.chain_for(vt), config.fuzzy_threshold)
    }

    fn result_with_issues(agent: AgentId, issues: &[&str]) -> AgentResult {
        AgentResult::new(agent, 0.8, 10)
            .with_issues(issues.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_case_whitespace_dedup() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[
            result_with_issues(AgentId::DeepSeek, &["Missing   error handling"]),
            result_with_issues(AgentId::Claude, &["missing error handling."]),
        ]);

        assert_eq!(classified.issues.len(), 1);
        assert_eq!(classified.issues[0].agents.len(), 2);
    }

    #[test]
    fn test_multi_agent_agreement_promotes() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[
            result_with_issues(AgentId::DeepSeek, &["Unvalidated input path"]),
            result_with_issues(AgentId::Claude, &["Unvalidated input path"]),
        ]);

        assert_eq!(classified.issues[0].severity, Severity::Priority);
        assert_eq!(classified.priority_texts().len(), 1);
    }

    #[test]
    fn test_critical_vocabulary_promotes_single_agent() {
        let c = classifier(ValidationType::SecurityTesting);
        let classified = c.classify(&[result_with_issues(
            AgentId::Grok,
            &["Command injection vulnerability in shell call"],
        )]);

        assert_eq!(classified.issues[0].severity, Severity::Priority);
    }

    #[test]
    fn test_regular_issue_stays_regular() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[result_with_issues(
            AgentId::DeepSeek,
            &["Documentation gaps identified"],
        )]);

        assert_eq!(classified.issues[0].severity, Severity::Regular);
    }

    #[test]
    fn test_fuzzy_match_merges_near_duplicates() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[
            result_with_issues(AgentId::DeepSeek, &["possible sql injection in query builder"]),
            result_with_issues(AgentId::Claude, &["possible sql injection in query builder!"]),
        ]);

        assert_eq!(classified.issues.len(), 1);
    }

    #[test]
    fn test_first_seen_wording_kept() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[
            result_with_issues(AgentId::DeepSeek, &["Hardcoded Credentials"]),
            result_with_issues(AgentId::Claude, &["hardcoded credentials"]),
        ]);

        assert_eq!(classified.issues[0].text, "Hardcoded Credentials");
    }

    #[test]
    fn test_suggestions_deduped_in_order() {
        let c = classifier(ValidationType::GeneralValidation);
        let classified = c.classify(&[
            result_with_issues(AgentId::DeepSeek, &[])
                .with_suggestions(vec!["Add tests".into(), "Use logging".into()]),
            result_with_issues(AgentId::Claude, &[])
                .with_suggestions(vec!["add tests".into(), "Pin versions".into()]),
        ]);

        assert_eq!(
            classified.suggestions,
            vec!["Add tests", "Use logging", "Pin versions"]
        );
    }
}
