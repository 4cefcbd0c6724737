//! Client for a Judge0-compatible remote execution engine.
//!
//! Provides:
//! - `ClientConfig` - Endpoint, polling budget and resource limits
//! - `Judge0Client` - Submit/poll driver implementing `ExecutionEngine`
//! - Wire protocol types

pub mod config;
pub mod judge0;

pub use config::ClientConfig;
pub use judge0::{EngineLanguage, Judge0Client};
