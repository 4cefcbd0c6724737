//! Judge0 submission protocol and client.

pub mod client;
pub mod protocol;

pub use client::Judge0Client;
pub use protocol::EngineLanguage;
