//! Judge0 wire protocol.
//!
//! Text fields travel base64-encoded (`base64_encoded=true`) so that
//! programs printing invalid UTF-8 still produce a readable result.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use j0_core::{EngineError, JobStatus, RunResult, Submission};
use serde::{Deserialize, Serialize};

use crate::ClientConfig;

/// Body of `POST /submissions`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest {
    pub source_code: String,
    pub language_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Seconds.
    pub cpu_time_limit: f64,
    /// Kilobytes.
    pub memory_limit: u64,
}

impl SubmissionRequest {
    /// Encode a submission with the limits from `config`.
    #[must_use]
    pub fn encode(submission: &Submission, config: &ClientConfig) -> Self {
        Self {
            source_code: BASE64.encode(&submission.source_code),
            language_id: submission.language_id,
            stdin: submission
                .stdin
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| BASE64.encode(s)),
            cpu_time_limit: config.cpu_time_limit.as_secs_f64(),
            memory_limit: config.memory_limit_kb,
        }
    }
}

/// Response of `POST /submissions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Response of `GET /submissions/{token}`.
///
/// Every field except `status` may be null while the job is queued.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub memory: Option<u64>,
    pub status: JobStatus,
}

impl SubmissionResponse {
    /// Decode into a normalized result.
    ///
    /// # Errors
    /// Returns `EngineError::Decode` if a text field is not valid base64.
    pub fn into_result(self, token: &str) -> Result<RunResult, EngineError> {
        let exit_code = self
            .exit_code
            .unwrap_or_else(|| i32::from(!self.status.is_accepted()));

        Ok(RunResult {
            token: self.token.unwrap_or_else(|| token.to_string()),
            stdout: decode_field("stdout", self.stdout)?,
            stderr: decode_field("stderr", self.stderr)?,
            compile_output: decode_field("compile_output", self.compile_output)?,
            message: decode_field("message", self.message)?,
            exit_code,
            time_secs: self.time.as_deref().and_then(|t| t.trim().parse().ok()),
            memory_kb: self.memory,
            status: self.status,
        })
    }
}

/// Entry of `GET /languages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLanguage {
    pub id: u32,
    pub name: String,
}

/// The engine wraps base64 output at 60 columns, so whitespace is dropped
/// before decoding.
fn decode_field(field: &str, value: Option<String>) -> Result<String, EngineError> {
    let Some(value) = value else {
        return Ok(String::new());
    };
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| EngineError::Decode(format!("{field}: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
