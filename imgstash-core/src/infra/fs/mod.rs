//! File-system and network primitives.
//!
//! The raw capabilities ([`FileSystem`], [`Downloader`]) carry no locking of
//! their own. [`GuardedFs`] wraps them so every call is deduplicated per path
//! by the shared operation coordinator.

pub mod download;
pub mod guarded;
pub mod primitives;

pub use download::*;
pub use guarded::*;
pub use primitives::*;
