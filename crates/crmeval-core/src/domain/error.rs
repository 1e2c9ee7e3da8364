//! Error taxonomy for CRM Eval.

use std::path::PathBuf;

/// Errors produced by an agent invoker for a single query.
///
/// These are recovered by the runner: the affected test is scored as a
/// failure and the run continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    #[error("invocation timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("no recorded response for query: {query}")]
    NotFound { query: String },

    #[error("agent channel unavailable: {0}")]
    ChannelUnavailable(String),
}

impl From<reqwest::Error> for InvocationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InvocationError::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            InvocationError::InvalidResponse(err.to_string())
        } else {
            InvocationError::Transport(err.to_string())
        }
    }
}

/// CRM Eval errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("configuration error: duplicate test case id: {id}")]
    DuplicateTestId { id: String },

    #[error("configuration error: test case {id} has no success criteria")]
    EmptyCriteria { id: String },

    #[error("registry is empty: no test cases to run")]
    EmptyRegistry,

    #[error("agent channel failed: {0}")]
    Channel(InvocationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The report could not be stored. The in-memory report is unaffected.
    #[error("report could not be persisted to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Whether this error stems from bad suite or pattern definitions.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EvalError::Configuration(_)
                | EvalError::DuplicateTestId { .. }
                | EvalError::EmptyCriteria { .. }
        )
    }
}

/// Result type for CRM Eval operations.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_display() {
        let err = EvalError::DuplicateTestId {
            id: "TC001".to_string(),
        };
        assert!(err.to_string().contains("duplicate test case id"));
        assert!(err.to_string().contains("TC001"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_registry_is_not_configuration() {
        let err = EvalError::EmptyRegistry;
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_persistence_display_names_path() {
        let err = EvalError::Persistence {
            path: PathBuf::from("evaluation/reports"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("evaluation/reports"), "{text}");
        assert!(text.contains("denied"), "{text}");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_timeout_display() {
        let err = InvocationError::Timeout { limit_ms: 1500 };
        assert_eq!(err.to_string(), "invocation timed out after 1500ms");
    }
}
