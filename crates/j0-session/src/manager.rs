//! Session manager: the single entry point for CLI, HTTP and agent tools.

use std::time::Instant;

use chrono::Utc;
use j0_core::{
    EngineError, ExecutionEngine, JobStatus, Language, NewExecution, Session, SessionFilter,
    SessionId, SessionStatus, SessionStorage, StorageError, Submission,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::env;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Holds the id as the caller spelled it; ids are opaque to callers.
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {id} is {status}")]
    InvalidState { id: SessionId, status: SessionStatus },
    #[error("Unsupported language: {0} (supported: {supported})", supported = Language::supported_names())]
    LanguageUnsupported(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Persistence(StorageError),
}

impl From<StorageError> for ManagerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => Self::NotFound(id.to_string()),
            StorageError::InvalidState { id, status } => Self::InvalidState { id, status },
            other @ StorageError::Persistence { .. } => Self::Persistence(other),
        }
    }
}

impl ManagerError {
    /// Errors caused by the request itself rather than the environment.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InvalidState { .. }
                | Self::LanguageUnsupported(_)
                | Self::InvalidRequest(_)
        )
    }
}

/// Resolve a caller-supplied session id.
///
/// A string that cannot name any session is reported like any other
/// unknown id.
///
/// # Errors
/// Returns `NotFound` when `raw` is not a valid session id.
pub fn parse_session_id(raw: &str) -> Result<SessionId, ManagerError> {
    raw.trim()
        .parse()
        .map_err(|_| ManagerError::NotFound(raw.to_string()))
}

/// Caller-visible result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Id of the recorded history entry, absent if recording failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub status: JobStatus,
    /// Wall-clock time of submit, poll and record.
    pub duration_ms: f64,
    /// Set when the run succeeded but could not be durably recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Session manager for coordinating executions against a remote engine.
pub struct SessionManager<S, E>
where
    S: SessionStorage,
    E: ExecutionEngine,
{
    storage: S,
    engine: E,
}

impl<S, E> SessionManager<S, E>
where
    S: SessionStorage,
    E: ExecutionEngine,
{
    /// Create a new session manager.
    #[must_use]
    pub const fn new(storage: S, engine: E) -> Self {
        Self { storage, engine }
    }

    /// Underlying store.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Underlying engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Create a new active session.
    ///
    /// # Errors
    /// Returns `LanguageUnsupported` for unknown languages (the store is not
    /// touched), `Persistence` if the session cannot be written.
    pub async fn create_session(
        &self,
        language: &str,
        name: Option<String>,
    ) -> Result<Session, ManagerError> {
        let language: Language = language
            .parse()
            .map_err(|_| ManagerError::LanguageUnsupported(language.to_string()))?;
        let name = name.filter(|n| !n.trim().is_empty());
        Ok(self.storage.create(language, name).await?)
    }

    /// Get a session by ID.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn get_session(&self, id: SessionId) -> Result<Session, ManagerError> {
        Ok(self.storage.get(id).await?)
    }

    /// List sessions, oldest first.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, ManagerError> {
        Ok(self.storage.list(filter).await?)
    }

    /// Run code in a session.
    ///
    /// The session env is injected in front of `code`; the original `code`
    /// is what gets recorded. Failing to record is reported through
    /// [`ExecutionOutcome::warning`], not as an error.
    ///
    /// # Errors
    /// Returns `NotFound`, `InvalidState` for closed sessions,
    /// `InvalidRequest` for empty code, or `Engine` if the remote run fails.
    /// Nothing is recorded when the remote run fails.
    #[tracing::instrument(skip(self, code, stdin), fields(session_id = %id))]
    pub async fn execute(
        &self,
        id: SessionId,
        code: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionOutcome, ManagerError> {
        if code.trim().is_empty() {
            return Err(ManagerError::InvalidRequest("code is required".into()));
        }

        let session = self.storage.get(id).await?;
        if !session.is_active() {
            return Err(ManagerError::InvalidState {
                id,
                status: session.status,
            });
        }

        let submission = Submission {
            source_code: env::inject(session.language, &session.env, code),
            language_id: session.language_id,
            stdin: stdin.map(str::to_string),
        };

        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.engine.execute(submission).await?;
        let run_ms = elapsed_ms(started);

        let stderr = result.diagnostics().to_string();
        let recorded = self
            .storage
            .add_execution(
                id,
                NewExecution {
                    code: code.to_string(),
                    output: result.stdout.clone(),
                    stderr: stderr.clone(),
                    exit_code: result.exit_code,
                    status: result.status.clone(),
                    time: started_at,
                    duration_ms: run_ms,
                },
            )
            .await;

        let (execution_id, warning) = match recorded {
            Ok(execution) => (Some(execution.id), None),
            Err(e) => {
                tracing::warn!("Failed to record execution: {e}");
                (None, Some(format!("execution was not recorded: {e}")))
            }
        };

        Ok(ExecutionOutcome {
            execution_id,
            stdout: result.stdout,
            stderr,
            exit_code: result.exit_code,
            status: result.status,
            duration_ms: elapsed_ms(started),
            warning,
        })
    }

    /// Set an environment variable for subsequent executions.
    ///
    /// # Errors
    /// Returns `InvalidRequest` for keys that are not identifiers,
    /// `NotFound`, or `InvalidState` for closed sessions.
    #[tracing::instrument(skip(self, value), fields(session_id = %id))]
    pub async fn set_env(
        &self,
        id: SessionId,
        key: &str,
        value: &str,
    ) -> Result<Session, ManagerError> {
        if !env::is_valid_key(key) {
            return Err(ManagerError::InvalidRequest(format!(
                "invalid environment variable name: {key:?}"
            )));
        }
        Ok(self
            .storage
            .set_env(id, key.to_string(), value.to_string())
            .await?)
    }

    /// Read the last `lines` lines of the session log (0 = everything).
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn get_log(&self, id: SessionId, lines: usize) -> Result<String, ManagerError> {
        Ok(self.storage.read_log(id, lines).await?)
    }

    /// Close a session. Closing an already closed session succeeds.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn close_session(&self, id: SessionId) -> Result<Session, ManagerError> {
        Ok(self.storage.close(id).await?)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
