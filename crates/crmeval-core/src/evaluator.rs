//! Scores one invocation against one test case.

use std::borrow::Cow;

use crate::criteria::{kinds, CriterionRegistry};
use crate::domain::{
    is_success, score_verdicts, Criterion, CriterionVerdict, Expectation, InvocationResult,
    TestCase, TestResult,
};

/// Applies a test case's success criteria to an invocation result.
///
/// Stateless apart from the handler registry: scoring the same pair twice
/// yields the same [`TestResult`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    criteria: CriterionRegistry,
}

impl Evaluator {
    pub fn new(criteria: CriterionRegistry) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &CriterionRegistry {
        &self.criteria
    }

    /// Produce one verdict per criterion, in declaration order, and the score.
    pub fn evaluate(&self, case: &TestCase, invocation: &InvocationResult) -> TestResult {
        let criterion_verdicts: Vec<CriterionVerdict> = case
            .success_criteria
            .iter()
            .map(|criterion| self.judge(case, criterion, invocation))
            .collect();

        let score = score_verdicts(&criterion_verdicts);

        TestResult {
            test_id: case.id.clone(),
            category: case.category.clone(),
            query: case.query.clone(),
            score,
            success: is_success(score),
            criterion_verdicts,
            elapsed_seconds: invocation.elapsed_seconds,
            tools_used: invocation.tools_used.clone(),
            error: invocation.error.clone(),
            raw_response: invocation.response_text.clone(),
        }
    }

    fn judge(
        &self,
        case: &TestCase,
        criterion: &Criterion,
        invocation: &InvocationResult,
    ) -> CriterionVerdict {
        // An erroring invocation carries no trustworthy content.
        if let Some(err) = &invocation.error {
            return CriterionVerdict::fail(&criterion.name, format!("invocation error: {err}"));
        }

        let Some(handler) = self.criteria.get(&criterion.name) else {
            return CriterionVerdict::fail(&criterion.name, "unknown criterion");
        };

        let expectation = bind_expectation(case, criterion);
        (**handler)(&expectation, invocation).into_verdict(&criterion.name)
    }
}

/// `tool_used: true` means "the tools this case lists in `expected_tools`".
fn bind_expectation<'a>(case: &'a TestCase, criterion: &'a Criterion) -> Cow<'a, Expectation> {
    match (criterion.name.as_str(), &criterion.expectation) {
        (kinds::TOOL_USED, Expectation::Flag(true)) => Cow::Owned(Expectation::List(
            case.expected_tools.iter().cloned().collect(),
        )),
        (_, expectation) => Cow::Borrowed(expectation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Verdict;

    fn completed(text: &str, tools: &[&str]) -> InvocationResult {
        InvocationResult::completed(text, tools.iter().map(|t| t.to_string()).collect(), 1.0)
    }

    #[test]
    fn test_binds_tool_used_to_expected_tools() {
        let case = TestCase::new("TC003", "Скільки коштує курс Python?", "pricing")
            .expect_tool("get_course_price")
            .criterion(kinds::TOOL_USED, Expectation::Flag(true));
        let result = Evaluator::default().evaluate(&case, &completed("", &["get_course_details"]));
        assert_eq!(result.criterion_verdicts[0].verdict, Verdict::Fail);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_unknown_criterion_counts_as_failure() {
        let case = TestCase::new("TC900", "q", "misc")
            .criterion(kinds::NO_TOOL_USED, Expectation::Flag(true))
            .criterion("sounds_confident", Expectation::Flag(true));
        let result = Evaluator::default().evaluate(&case, &completed("ok", &[]));
        assert_eq!(result.criterion_verdicts.len(), 2);
        assert_eq!(
            result.criterion_verdicts[1].detail.as_deref(),
            Some("unknown criterion")
        );
        assert_eq!(result.score, 0.5);
        assert!(!result.success);
    }

    #[test]
    fn test_error_fails_every_criterion() {
        let case = TestCase::new("TC006", "Дякую", "conversation")
            .criterion(kinds::NO_TOOL_USED, Expectation::Flag(true))
            .criterion(kinds::RESPONSE_LENGTH_MIN, Expectation::Minimum(0));
        let invocation = InvocationResult::failed("invocation timed out after 50ms", 0.05);
        let result = Evaluator::default().evaluate(&case, &invocation);
        assert_eq!(result.score, 0.0);
        assert!(!result.success);
        assert!(result
            .criterion_verdicts
            .iter()
            .all(|v| v.detail.as_deref().is_some_and(|d| d.starts_with("invocation error"))));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let case = TestCase::new("TC001", "Привіт, чи є зараз курси по Python?", "course_search")
            .expect_tool("search_courses")
            .criterion(kinds::TOOL_USED, Expectation::Flag(true))
            .criterion(kinds::CONTAINS_KEYWORDS, Expectation::list(["курс"]))
            .criterion(kinds::RESPONSE_LENGTH_MIN, Expectation::Minimum(50));
        let invocation = completed("Так, є курс Python для початківців.", &["search_courses"]);
        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.evaluate(&case, &invocation),
            evaluator.evaluate(&case, &invocation)
        );
    }
}
