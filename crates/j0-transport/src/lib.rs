//! Outer surfaces for the session coordinator.
//!
//! Provides:
//! - Wire types shared by the HTTP API and tool calls
//! - HTTP API router (axum)
//! - Agent-tool schemas and dispatcher

pub mod http;
pub mod protocol;
pub mod tools;

pub use http::{ApiError, router};
pub use protocol::{ToolCall, ToolDefinition};
