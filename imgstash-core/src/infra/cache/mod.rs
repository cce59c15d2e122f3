//! Persistent cache index infra.
//!
//! Key derivation, the durable key/value capability (with a typed facade
//! around `cacache`), and the index that maps cache keys to local paths.

pub mod cache_index;
pub mod cache_key;
pub mod kv_store;

pub use cache_index::*;
pub use cache_key::*;
pub use kv_store::*;
