//! Wire types for the HTTP API and tool calls.

use j0_core::{Language, SessionFilter, SessionStatus};
use j0_session::ManagerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log lines returned when the caller does not ask for a count.
pub const DEFAULT_LOG_LINES: i64 = 100;

/// `POST /sessions` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `POST /sessions/{id}/execute` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

/// `POST /sessions/{id}/env` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetEnvRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// `GET /sessions` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<SessionStatus>,
    pub language: Option<String>,
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Convert into a store filter.
    ///
    /// # Errors
    /// Returns `LanguageUnsupported` for an unknown language filter.
    pub fn into_filter(self) -> Result<SessionFilter, ManagerError> {
        let language = self
            .language
            .map(|l| {
                l.parse::<Language>()
                    .map_err(|_| ManagerError::LanguageUnsupported(l.clone()))
            })
            .transpose()?;
        Ok(SessionFilter {
            status: self.status,
            language,
            limit: self.limit,
        })
    }
}

/// `GET /sessions/{id}/log` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub lines: Option<i64>,
}

/// Map a caller-supplied line count: missing means the default, anything
/// `<= 0` means the whole log.
#[must_use]
pub fn log_lines(requested: Option<i64>) -> usize {
    usize::try_from(requested.unwrap_or(DEFAULT_LOG_LINES)).unwrap_or(0)
}

/// Simple acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Tool invocation from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Tool description advertised to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}
