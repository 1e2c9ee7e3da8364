//! Structured lifecycle events for evaluation runs.
//!
//! Every event carries an `event` field (`eval.*`) so runs can be followed
//! in JSON logs. Events raised while a run executes are nested in
//! [`run_span`], so each carries the run id; [`RunSpan`] re-enters the same
//! span shape for work done after the run, such as writing the report.

use tracing::{info, warn, Span};

/// Span covering one evaluation run.
pub fn run_span(run_id: &str, suite: &str) -> Span {
    tracing::info_span!("crmeval.run", run_id = %run_id, suite = %suite)
}

/// RAII guard holding the run-scoped span open.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str, suite: &str) -> Self {
        Self {
            _span: run_span(run_id, suite).entered(),
        }
    }
}

pub fn emit_run_started(suite: &str, agent: &str, total_tests: usize) {
    info!(
        event = "eval.run_started",
        suite = %suite,
        agent = %agent,
        total_tests = total_tests,
    );
}

/// One test scored.
pub fn emit_test_scored(test_id: &str, score: f64, success: bool, elapsed_seconds: f64) {
    info!(
        event = "eval.test_scored",
        test_id = %test_id,
        score = score,
        success = success,
        elapsed_seconds = elapsed_seconds,
    );
}

/// The agent failed for one query; the test is scored as a failure.
pub fn emit_invocation_failed(test_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "eval.invocation_failed", test_id = %test_id, error = %error);
}

pub fn emit_run_finished(suite: &str, total_tests: usize, passed: usize, duration_ms: u64) {
    info!(
        event = "eval.run_finished",
        suite = %suite,
        total_tests = total_tests,
        passed = passed,
        duration_ms = duration_ms,
    );
}

pub fn emit_report_written(run_id: &str, path: &std::path::Path, average_score: f64) {
    info!(
        event = "eval.report_written",
        run_id = %run_id,
        path = %path.display(),
        average_score = average_score,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_is_current_while_entered() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            {
                let _span = RunSpan::enter("4f1c2a9e", "course_assistant");
                let current = Span::current();
                assert_eq!(current.metadata().map(|m| m.name()), Some("crmeval.run"));
                assert!(current
                    .metadata()
                    .is_some_and(|m| m.fields().field("run_id").is_some()));
                emit_invocation_failed("TC001", &"boom");
            }
            assert!(Span::current().is_none());
        });
    }
}
