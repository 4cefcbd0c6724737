//! Core abstractions for remote code-execution sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` / `Execution` - The persisted session model
//! - `Language` - Language aliases and remote engine language codes
//! - `SessionStorage` and `ExecutionEngine` traits

pub mod language;
pub mod traits;

pub use language::{Language, UnsupportedLanguage};
pub use traits::{
    EngineError, Execution, ExecutionEngine, JobStatus, NewExecution, RunResult, Session,
    SessionFilter, SessionId, SessionStatus, SessionStorage, StorageError, Submission,
};
