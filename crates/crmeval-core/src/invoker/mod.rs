//! The agent invocation boundary.
//!
//! The core only sees [`AgentInvoker`]: submit a query, receive the text and
//! the tool trace. How the agent is reached is the adapter's business.
//!
//! Adapters:
//! - `HttpAgentInvoker`: live agent behind an HTTP chat endpoint
//! - `ReplayInvoker`: previously recorded responses, for offline re-scoring

mod http;
mod replay;

pub use http::{AgentEndpointConfig, HttpAgentInvoker};
pub use replay::{RecordedResponse, ReplayInvoker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::InvocationError;

/// What an adapter returns for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentReply {
    pub response_text: String,
    /// Tool names in call order.
    pub tools_used: Vec<String>,
    /// Adapter's own timing, if it keeps one. The runner's measurement wins.
    pub reported_elapsed_seconds: Option<f64>,
}

impl AgentReply {
    pub fn new(response_text: impl Into<String>, tools_used: Vec<String>) -> Self {
        Self {
            response_text: response_text.into(),
            tools_used,
            reported_elapsed_seconds: None,
        }
    }
}

/// Submits queries to the agent under test.
///
/// `open` and `close` bracket a whole run so shared resources (HTTP client,
/// credentials, conversation state) are acquired once and released once.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Acquire run-scoped resources. Failure aborts the run.
    async fn open(&mut self) -> Result<(), InvocationError> {
        Ok(())
    }

    /// Send one query.
    async fn invoke(&self, query: &str) -> Result<AgentReply, InvocationError>;

    /// Release run-scoped resources.
    async fn close(&mut self) {}

    /// Short label for logs.
    fn describe(&self) -> String {
        "agent".to_string()
    }
}
