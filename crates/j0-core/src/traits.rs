//! Core traits for session storage and remote execution.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::Language;

/// Session identifier.
pub type SessionId = Uuid;

/// Session status.
///
/// Transitions are monotonic: `Active` -> `Closed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session accepts executions and env changes.
    Active,
    /// Session is read-only.
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Session filter for queries.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Filter by status.
    pub status: Option<SessionStatus>,
    /// Filter by language.
    pub language: Option<Language>,
    /// Limit results.
    pub limit: Option<usize>,
}

impl SessionFilter {
    /// Whether a session passes this filter (ignores `limit`).
    #[must_use]
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        if let Some(language) = self.language {
            if session.language != language {
                return false;
            }
        }
        true
    }
}

/// Status reported by the remote engine for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

impl JobStatus {
    pub const IN_QUEUE: u32 = 1;
    pub const PROCESSING: u32 = 2;
    pub const ACCEPTED: u32 = 3;

    /// Create a status from its numeric code.
    #[must_use]
    pub fn new(id: u32, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }

    /// Terminal statuses are everything past queued/processing,
    /// whether the program succeeded or failed inside the sandbox.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.id >= Self::ACCEPTED
    }

    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.id == Self::ACCEPTED
    }
}

/// One recorded execution inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution identifier.
    pub id: Uuid,
    /// Caller-supplied source, before environment injection.
    pub code: String,
    /// Captured stdout.
    pub output: String,
    /// Captured stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub exit_code: i32,
    /// Terminal status reported by the engine.
    pub status: JobStatus,
    /// Start timestamp.
    pub time: DateTime<Utc>,
    /// Wall-clock time of submit, poll and record.
    pub duration_ms: f64,
}

/// Execution data handed to the store, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub code: String,
    pub output: String,
    pub stderr: String,
    pub exit_code: i32,
    pub status: JobStatus,
    pub time: DateTime<Utc>,
    pub duration_ms: f64,
}

impl NewExecution {
    /// Attach an identifier.
    #[must_use]
    pub fn into_execution(self, id: Uuid) -> Execution {
        Execution {
            id,
            code: self.code,
            output: self.output,
            stderr: self.stderr,
            exit_code: self.exit_code,
            status: self.status,
            time: self.time,
            duration_ms: self.duration_ms,
        }
    }
}

/// Persisted session data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Optional human label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub language: Language,
    /// Engine language code captured at creation.
    pub language_id: u32,
    /// Current status.
    pub status: SessionStatus,
    /// Environment re-injected before every execution.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Append-only execution history, oldest first.
    #[serde(default)]
    pub history: Vec<Execution>,
    /// Append-only human-readable log.
    pub log_file: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session {id} is {status}")]
    InvalidState { id: SessionId, status: SessionStatus },
    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Wrap an I/O failure on `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Trait for session storage backends.
///
/// Mutations on one session id are linearized; mutations on
/// different ids must not block each other.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Create and persist a new active session.
    async fn create(&self, language: Language, name: Option<String>)
    -> Result<Session, StorageError>;

    /// Get a session by ID.
    async fn get(&self, id: SessionId) -> Result<Session, StorageError>;

    /// List sessions with optional filter, oldest first.
    async fn list(&self, filter: SessionFilter) -> Result<Vec<Session>, StorageError>;

    /// Set one environment variable on an active session.
    async fn set_env(
        &self,
        id: SessionId,
        key: String,
        value: String,
    ) -> Result<Session, StorageError>;

    /// Append an execution to history and to the session log.
    async fn add_execution(
        &self,
        id: SessionId,
        execution: NewExecution,
    ) -> Result<Execution, StorageError>;

    /// Mark a session closed. Closing twice is not an error.
    async fn close(&self, id: SessionId) -> Result<Session, StorageError>;

    /// Read the last `lines` lines of the session log (0 = everything).
    async fn read_log(&self, id: SessionId, lines: usize) -> Result<String, StorageError>;
}

/// Code submission for the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: Option<String>,
}

/// Normalized result of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Engine token the job was polled with.
    pub token: String,
    pub status: JobStatus,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    /// Engine-supplied diagnostic message, if any.
    pub message: String,
    pub exit_code: i32,
    /// Engine-reported CPU time in seconds.
    pub time_secs: Option<f64>,
    /// Engine-reported memory in kilobytes.
    pub memory_kb: Option<u64>,
}

impl RunResult {
    /// Stderr, falling back to compiler output when the program never ran.
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        if self.stderr.is_empty() {
            &self.compile_output
        } else {
            &self.stderr
        }
    }
}

/// Remote engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `status` is 0 when the engine could not be reached at all.
    #[error("Submission failed ({status}): {body}")]
    Submission { status: u16, body: String },
    #[error("Status poll rejected ({status}): {body}")]
    Poll { status: u16, body: String },
    #[error("Engine rejected GET {path} ({status}): {body}")]
    Request {
        path: String,
        status: u16,
        body: String,
    },
    #[error("Engine unreachable: {0}")]
    Transport(String),
    #[error("Malformed engine response: {0}")]
    Decode(String),
    #[error("Execution timed out after {attempts} status polls")]
    Timeout { attempts: u32 },
}

/// Trait for remote execution engines.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit code and wait until the job reaches a terminal status.
    async fn execute(&self, submission: Submission) -> Result<RunResult, EngineError>;
}

#[async_trait]
impl<T: ExecutionEngine + ?Sized> ExecutionEngine for Arc<T> {
    async fn execute(&self, submission: Submission) -> Result<RunResult, EngineError> {
        (**self).execute(submission).await
    }
}
