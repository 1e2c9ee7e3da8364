//! Offline adapter that answers from previously recorded responses.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AgentInvoker, AgentReply};
use crate::domain::error::{EvalError, Result};
use crate::domain::InvocationError;

/// One captured agent exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    pub query: String,
    pub response: String,
    #[serde(default, alias = "tool_calls")]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordingFile {
    Bare(Vec<RecordedResponse>),
    Wrapped { responses: Vec<RecordedResponse> },
}

/// Looks queries up by exact text.
///
/// A query recorded more than once resolves to the last recording.
#[derive(Debug, Clone, Default)]
pub struct ReplayInvoker {
    by_query: HashMap<String, RecordedResponse>,
}

impl ReplayInvoker {
    pub fn from_records(records: impl IntoIterator<Item = RecordedResponse>) -> Self {
        Self {
            by_query: records
                .into_iter()
                .map(|r| (r.query.clone(), r))
                .collect(),
        }
    }

    /// Parse a JSON array of recordings, `{"responses": [...]}`, or JSON Lines
    /// with one recording per line. Unknown fields such as `ground_truth`
    /// are ignored.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let records = match serde_json::from_str::<RecordingFile>(raw) {
            Ok(RecordingFile::Bare(records)) => records,
            Ok(RecordingFile::Wrapped { responses }) => responses,
            Err(document_err) => parse_json_lines(raw).map_err(|line_err| {
                EvalError::Configuration(format!(
                    "invalid recorded responses: {document_err}; as JSON Lines: {line_err}"
                ))
            })?,
        };
        Ok(Self::from_records(records))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Configuration(format!("cannot read responses {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }
}

fn parse_json_lines(raw: &str) -> std::result::Result<Vec<RecordedResponse>, String> {
    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| format!("line {}: {e}", idx + 1))?;
        records.push(record);
    }
    if records.is_empty() {
        return Err("no recordings".to_string());
    }
    Ok(records)
}

#[async_trait]
impl AgentInvoker for ReplayInvoker {
    async fn invoke(&self, query: &str) -> std::result::Result<AgentReply, InvocationError> {
        let record = self
            .by_query
            .get(query)
            .ok_or_else(|| InvocationError::NotFound {
                query: query.to_string(),
            })?;
        Ok(AgentReply {
            response_text: record.response.clone(),
            tools_used: record.tools_used.clone(),
            reported_elapsed_seconds: record.execution_time,
        })
    }

    fn describe(&self) -> String {
        format!("replay:{} recordings", self.by_query.len())
    }
}
