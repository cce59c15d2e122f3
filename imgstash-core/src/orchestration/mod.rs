//! Deduplication of concurrent file and network operations.

pub mod coordinator;

pub use coordinator::*;
