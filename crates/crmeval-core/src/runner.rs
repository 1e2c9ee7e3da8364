//! Sequential test execution against an agent invoker.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::domain::error::{EvalError, Result};
use crate::domain::{InvocationError, InvocationResult, TestCase, TestResult};
use crate::evaluator::Evaluator;
use crate::invoker::AgentInvoker;
use crate::obs;
use crate::registry::TestRegistry;

/// Adapter-reported and runner-measured times may differ by this much
/// before a warning is logged.
const TIMING_DRIFT_TOLERANCE_SECS: f64 = 1.0;

/// Execution knobs for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Per-invocation limit.
    pub timeout: Duration,
    /// Pause between consecutive tests (not after the last one).
    pub inter_test_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            inter_test_delay: Duration::ZERO,
        }
    }
}

impl RunConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_inter_test_delay(mut self, delay: Duration) -> Self {
        self.inter_test_delay = delay;
        self
    }
}

/// Runs every case of a registry, one at a time, in declaration order.
///
/// At most one invocation is in flight. A failing or slow agent never aborts
/// the run: the affected test is scored as a failure and the next one starts.
/// Errors returned by the invoker and timeouts are handled this way; a panic
/// inside the invoker is not caught and unwinds out of [`run`](Self::run).
///
/// Every event logged during a run is nested in a span carrying the
/// runner's [`run_id`](Self::run_id).
pub struct TestRunner<I: AgentInvoker> {
    invoker: I,
    evaluator: Evaluator,
    config: RunConfig,
    run_id: String,
}

impl<I: AgentInvoker> TestRunner<I> {
    pub fn new(invoker: I, evaluator: Evaluator, config: RunConfig) -> Self {
        Self {
            invoker,
            evaluator,
            config,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Use a caller-chosen run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Id stamped on this run's logs; pass it on to the report.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Give the invoker back, e.g. to inspect a fake after a run.
    pub fn into_invoker(self) -> I {
        self.invoker
    }

    /// Execute the suite and return one result per case, in order.
    ///
    /// Only an empty registry or a failure to open the agent channel is
    /// fatal.
    pub async fn run(&mut self, registry: &TestRegistry) -> Result<Vec<TestResult>> {
        if registry.is_empty() {
            return Err(EvalError::EmptyRegistry);
        }

        let span = obs::run_span(&self.run_id, registry.name());
        self.run_inner(registry).instrument(span).await
    }

    async fn run_inner(&mut self, registry: &TestRegistry) -> Result<Vec<TestResult>> {
        let started = Instant::now();
        obs::emit_run_started(registry.name(), &self.invoker.describe(), registry.len());

        self.invoker.open().await.map_err(EvalError::Channel)?;

        let mut results = Vec::with_capacity(registry.len());
        for (index, case) in registry.iter().enumerate() {
            if index > 0 && !self.config.inter_test_delay.is_zero() {
                tokio::time::sleep(self.config.inter_test_delay).await;
            }

            let invocation = self.invoke_case(case).await;
            let result = self.evaluator.evaluate(case, &invocation);
            obs::emit_test_scored(
                &result.test_id,
                result.score,
                result.success,
                result.elapsed_seconds,
            );
            results.push(result);
        }

        self.invoker.close().await;

        let passed = results.iter().filter(|r| r.success).count();
        obs::emit_run_finished(
            registry.name(),
            results.len(),
            passed,
            started.elapsed().as_millis() as u64,
        );
        Ok(results)
    }

    async fn invoke_case(&self, case: &TestCase) -> InvocationResult {
        debug!(test_id = %case.id, query = %case.query, "invoking agent");
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, self.invoker.invoke(&case.query))
            .await
            .unwrap_or_else(|_| {
                Err(InvocationError::Timeout {
                    limit_ms: self.config.timeout.as_millis() as u64,
                })
            });
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(reply) => {
                if let Some(drift) = timing_drift(reply.reported_elapsed_seconds, elapsed) {
                    warn!(
                        test_id = %case.id,
                        drift_seconds = drift,
                        measured_seconds = elapsed,
                        "agent-reported time disagrees with measured time"
                    );
                }
                // Only the runner's own measurement is recorded.
                InvocationResult::completed(reply.response_text, reply.tools_used, elapsed)
            }
            Err(err) => {
                obs::emit_invocation_failed(&case.id, &err);
                InvocationResult::failed(err, elapsed)
            }
        }
    }
}

/// How far an adapter-reported time is from the measured one, when that
/// exceeds [`TIMING_DRIFT_TOLERANCE_SECS`].
fn timing_drift(reported: Option<f64>, measured: f64) -> Option<f64> {
    let drift = (reported? - measured).abs();
    (drift > TIMING_DRIFT_TOLERANCE_SECS).then_some(drift)
}
