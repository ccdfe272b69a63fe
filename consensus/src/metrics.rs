//! Derived code-quality metrics
//!
//! Cheap lexical heuristics attached to every consensus result. They are
//! deterministic functions of the submitted code and the classified
//! findings, so live and fallback results compute them the same way.

use crate::types::EnhancedMetrics;

const STRUCTURE_KEYWORDS: &[&str] = &[
    "for ", "while ", "if ", "elif ", "else if", "def ", "fn ", "function ", "class ", "struct ",
    "try", "match ", "import ", "use ",
];

const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "vulnerability",
    "attack",
    "exploit",
    "injection",
    "authentication",
    "authorization",
    "hardcoded",
    "overflow",
];

/// Structural density of the code (0.0-1.0)
pub fn complexity_score(code: &str) -> f64 {
    let lower = code.to_lowercase();
    let non_empty_lines = code.lines().filter(|l| !l.trim().is_empty()).count().max(1);

    let total: usize = STRUCTURE_KEYWORDS
        .iter()
        .map(|kw| lower.matches(kw).count())
        .sum();

    (total as f64 / non_empty_lines as f64).min(1.0)
}

/// Share of findings that are not security-related (0.0-1.0)
pub fn security_score(issues: &[String]) -> f64 {
    if issues.is_empty() {
        return 1.0;
    }
    let security_issues = issues
        .iter()
        .filter(|issue| {
            let lower = issue.to_lowercase();
            SECURITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .count();

    (1.0 - security_issues as f64 / issues.len() as f64).max(0.0)
}

/// Comment density, length, and naming-feedback signals combined (0.0-1.0)
pub fn maintainability_score(code: &str, suggestions: &[String]) -> f64 {
    let lines: Vec<&str> = code.lines().collect();
    let total_lines = lines.len().max(1);

    let comment_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with('#') || t.starts_with("//") || t.contains(" # ") || t.contains(" // ")
        })
        .count();
    let comment_density = (comment_lines as f64 / total_lines as f64).min(1.0);

    let length_factor = 1.0 - (total_lines as f64 / 100.0).min(1.0);

    let naming_suggestions = suggestions
        .iter()
        .filter(|s| s.to_lowercase().contains("naming"))
        .count();
    let naming_factor = if suggestions.is_empty() {
        1.0
    } else {
        1.0 - (naming_suggestions as f64 / suggestions.len() as f64).min(1.0)
    };

    (comment_density + length_factor + naming_factor) / 3.0
}

/// All derived metrics for one submission
pub fn compute(code: &str, issues: &[String], suggestions: &[String], weighted: f64) -> EnhancedMetrics {
    EnhancedMetrics {
        complexity_score: complexity_score(code),
        security_score: security_score(issues),
        maintainability_score: maintainability_score(code, suggestions),
        weighted_confidence: weighted,
    }
}
