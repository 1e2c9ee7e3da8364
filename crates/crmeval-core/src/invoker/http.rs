//! Live agent adapter over an HTTP chat endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{AgentInvoker, AgentReply};
use crate::domain::error::{EvalError, Result};
use crate::domain::InvocationError;

const URL_VAR: &str = "CRMEVAL_AGENT_URL";
const API_KEY_VAR: &str = "CRMEVAL_API_KEY";

/// Where the agent lives and how to authenticate.
///
/// The credential is opaque: it is forwarded as a bearer token and never
/// logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    /// Chat endpoint URL (e.g. "http://localhost:8000/api/chat")
    pub url: String,
    /// Bearer token (optional for local agents)
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AgentEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEndpointConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AgentEndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read `CRMEVAL_AGENT_URL` and the optional `CRMEVAL_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(URL_VAR)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| EvalError::Configuration(format!("{URL_VAR} not set")))?;
        let api_key = lookup(API_KEY_VAR).filter(|k| !k.is_empty());
        Ok(Self { url, api_key })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    conversation_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
    #[serde(default)]
    tools_used: Vec<String>,
    #[serde(default)]
    execution_time: Option<f64>,
}

/// HTTP client for the agent under test.
///
/// One conversation id is used for the whole run, matching how a single
/// user would talk to the assistant.
pub struct HttpAgentInvoker {
    config: AgentEndpointConfig,
    session: Option<Session>,
}

struct Session {
    client: reqwest::Client,
    conversation_id: String,
}

impl HttpAgentInvoker {
    pub fn new(config: AgentEndpointConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn open(&mut self) -> std::result::Result<(), InvocationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crmeval/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InvocationError::ChannelUnavailable(e.to_string()))?;
        let conversation_id = format!("eval-{}", Uuid::new_v4());
        info!(url = %self.config.url, conversation_id = %conversation_id, "agent session opened");
        self.session = Some(Session {
            client,
            conversation_id,
        });
        Ok(())
    }

    async fn invoke(&self, query: &str) -> std::result::Result<AgentReply, InvocationError> {
        let session = self.session.as_ref().ok_or_else(|| {
            InvocationError::ChannelUnavailable("session not opened".to_string())
        })?;

        let mut request = session.client.post(&self.config.url).json(&ChatRequest {
            message: query,
            conversation_id: &session.conversation_id,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvocationError::Transport(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: ChatResponse = response.json().await?;
        debug!(tools = ?body.tools_used, "agent replied");
        Ok(AgentReply {
            response_text: body.response,
            tools_used: body.tools_used,
            reported_elapsed_seconds: body.execution_time,
        })
    }

    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(conversation_id = %session.conversation_id, "agent session closed");
        }
    }

    fn describe(&self) -> String {
        format!("http:{}", self.config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AgentEndpointConfig::new("http://localhost:8000/api/chat")
            .with_api_key("super-secret");
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_endpoint_from_lookup() {
        let vars = |url: Option<&'static str>, key: Option<&'static str>| {
            move |name: &str| match name {
                URL_VAR => url.map(String::from),
                API_KEY_VAR => key.map(String::from),
                _ => None,
            }
        };

        let config = AgentEndpointConfig::from_lookup(vars(
            Some("http://localhost:8000/api/chat"),
            Some(""),
        ))
        .expect("url set");
        assert_eq!(config.url, "http://localhost:8000/api/chat");
        assert!(config.api_key.is_none());

        let config =
            AgentEndpointConfig::from_lookup(vars(Some("http://agent/chat"), Some("k-123")))
                .expect("url set");
        assert_eq!(config.api_key.as_deref(), Some("k-123"));

        let err = AgentEndpointConfig::from_lookup(vars(None, Some("k-123"))).expect_err("no url");
        assert!(err.is_configuration());
        assert!(err.to_string().contains(URL_VAR));
    }

    #[tokio::test]
    async fn test_invoke_before_open_is_channel_error() {
        let invoker = HttpAgentInvoker::new(AgentEndpointConfig::new("http://127.0.0.1:9/chat"));
        let err = invoker.invoke("Привіт").await.expect_err("not opened");
        assert!(matches!(err, InvocationError::ChannelUnavailable(_)));
    }

    #[test]
    fn test_chat_response_defaults() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"response": "Добрий день!"}"#).expect("parse");
        assert!(body.tools_used.is_empty());
        assert!(body.execution_time.is_none());
    }
}
