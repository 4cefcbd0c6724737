//! Storage implementations.

pub mod file;

pub use file::FileStorage;
