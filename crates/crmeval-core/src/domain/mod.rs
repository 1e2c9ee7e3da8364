//! Domain models for CRM Eval.
//!
//! Canonical definitions for the core entities:
//! - `TestCase`: Immutable scripted query plus its success criteria
//! - `InvocationResult`: What the agent produced for one query
//! - `TestResult`: Scored outcome of one test case

pub mod digest;
pub mod error;
pub mod result;
pub mod test_case;

// Re-export main types and errors
pub use digest::{canonical_json, compute_digest};
pub use error::{EvalError, InvocationError, Result};
pub use result::{
    is_success, score_verdicts, CriterionVerdict, InvocationResult, TestResult, Verdict,
    SUCCESS_THRESHOLD,
};
pub use test_case::{Criterion, Expectation, SuccessCriteria, TestCase};
