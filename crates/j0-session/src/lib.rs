//! Session orchestration and storage for remote code execution.
//!
//! Provides:
//! - `SessionManager` - Validate requests, inject env, run and record executions
//! - `FileStorage` - Disk-backed session store with per-session locking
//! - Execution log writer and per-language env injection

pub mod env;
pub mod log_writer;
pub mod manager;
pub mod storage;

pub use manager::{ExecutionOutcome, ManagerError, SessionManager, parse_session_id};
pub use storage::FileStorage;
