//! CRM Eval Core Library
//!
//! Offline evaluation harness for a conversational course-assistant agent:
//! a fixed battery of scripted queries is sent to the agent, each response
//! is scored against per-query success criteria, and the run is aggregated
//! into a persisted report.
//!
//! Pipeline: [`TestRegistry`] → [`TestRunner`] (via an [`AgentInvoker`]) →
//! [`Evaluator`] → [`EvaluationReport`].

pub mod criteria;
pub mod domain;
pub mod evaluator;
pub mod invoker;
pub mod obs;
pub mod registry;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use criteria::{BehaviorPattern, Check, CriterionFn, CriterionRegistry, PatternSet};

pub use domain::{
    CriterionVerdict, EvalError, Expectation, InvocationError, InvocationResult, Result,
    SuccessCriteria, TestCase, TestResult, Verdict, SUCCESS_THRESHOLD,
};

pub use evaluator::Evaluator;

pub use invoker::{
    AgentEndpointConfig, AgentInvoker, AgentReply, HttpAgentInvoker, RecordedResponse,
    ReplayInvoker,
};

pub use registry::{SuiteFile, TestRegistry};

pub use report::{
    read_report_json, render_summary, write_report_json, CategoryStats, EvaluationReport,
    Priority, Recommendation, RunDiagnostics, ToolCount,
};

pub use runner::{RunConfig, TestRunner};

pub use telemetry::init_tracing;
