//! Invocation outcomes and per-test scoring results.

use serde::{Deserialize, Serialize};

/// Minimum fraction of passed criteria for a test to count as successful.
pub const SUCCESS_THRESHOLD: f64 = 0.70;

/// What the agent produced for one query.
///
/// `error` being `None` means the invocation completed, not that the content
/// is correct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationResult {
    pub response_text: String,
    /// Tools actually invoked, in call order. Duplicates allowed.
    pub tools_used: Vec<String>,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

impl InvocationResult {
    /// A completed invocation.
    pub fn completed(
        response_text: impl Into<String>,
        tools_used: Vec<String>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            tools_used,
            elapsed_seconds,
            error: None,
        }
    }

    /// A failed invocation: empty response, no tools.
    pub fn failed(error: impl std::fmt::Display, elapsed_seconds: f64) -> Self {
        Self {
            response_text: String::new(),
            tools_used: Vec::new(),
            elapsed_seconds,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a single criterion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Verdict for one named criterion, with an optional explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionVerdict {
    pub name: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CriterionVerdict {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Pass,
            detail: None,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Fraction of passed verdicts. Zero verdicts score 0.0.
pub fn score_verdicts(verdicts: &[CriterionVerdict]) -> f64 {
    if verdicts.is_empty() {
        return 0.0;
    }
    let passed = verdicts.iter().filter(|v| v.passed()).count();
    passed as f64 / verdicts.len() as f64
}

/// Whether a score meets [`SUCCESS_THRESHOLD`].
pub fn is_success(score: f64) -> bool {
    score >= SUCCESS_THRESHOLD
}

/// Scored outcome of one test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub test_id: String,
    pub category: String,
    pub query: String,
    /// passed criteria / total criteria, unrounded.
    pub score: f64,
    pub success: bool,
    pub criterion_verdicts: Vec<CriterionVerdict>,
    pub elapsed_seconds: f64,
    pub tools_used: Vec<String>,
    pub error: Option<String>,
    /// Agent response kept for audit.
    pub raw_response: String,
}

impl TestResult {
    pub fn passed_criteria(&self) -> usize {
        self.criterion_verdicts.iter().filter(|v| v.passed()).count()
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &CriterionVerdict> {
        self.criterion_verdicts.iter().filter(|v| !v.passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdicts(pass: usize, fail: usize) -> Vec<CriterionVerdict> {
        let mut out: Vec<CriterionVerdict> = (0..pass)
            .map(|i| CriterionVerdict::pass(format!("p{i}")))
            .collect();
        out.extend((0..fail).map(|i| CriterionVerdict::fail(format!("f{i}"), "nope")));
        out
    }

    #[test]
    fn test_score_is_exact_fraction() {
        assert_eq!(score_verdicts(&verdicts(2, 1)), 2.0 / 3.0);
        assert_eq!(score_verdicts(&verdicts(3, 0)), 1.0);
        assert_eq!(score_verdicts(&verdicts(0, 4)), 0.0);
        assert_eq!(score_verdicts(&[]), 0.0);
    }

    #[test]
    fn test_threshold_boundary() {
        let at = score_verdicts(&verdicts(7, 3));
        assert!(is_success(at), "7/10 must pass");
        assert!(!is_success(0.699_999_999));
        assert!(!is_success(score_verdicts(&verdicts(2, 1))), "2/3 must fail");
    }

    #[test]
    fn test_adding_passing_verdict_never_lowers_score() {
        for pass in 0..5 {
            for fail in 0..5 {
                if pass + fail == 0 {
                    continue;
                }
                let before = score_verdicts(&verdicts(pass, fail));
                let after = score_verdicts(&verdicts(pass + 1, fail));
                assert!(after >= before, "{pass}/{fail}: {after} < {before}");
            }
        }
    }

    #[test]
    fn test_verdict_serializes_uppercase() {
        let v = CriterionVerdict::fail("no_tool_used", "unexpected tools: [search_courses]");
        let raw = serde_json::to_value(&v).expect("serialize");
        assert_eq!(raw["verdict"], "FAIL");
        assert_eq!(raw["detail"], "unexpected tools: [search_courses]");

        let raw = serde_json::to_value(CriterionVerdict::pass("x")).expect("serialize");
        assert!(raw.get("detail").is_none());
    }

    #[test]
    fn test_failed_invocation_is_empty() {
        let r = InvocationResult::failed("boom", 1.5);
        assert!(r.is_error());
        assert!(r.response_text.is_empty());
        assert!(r.tools_used.is_empty());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }
}
