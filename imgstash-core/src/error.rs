use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::orchestration::OperationKey;

/// Errors surfaced by the cache core.
///
/// `CacheError` is `Clone` so a single settled outcome can be handed to every
/// caller joined on the same in-flight operation. I/O errors are shared behind
/// an `Arc` for the same reason.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Operation already in progress: {key}")]
    AlreadyInProgress { key: OperationKey },

    #[error("Fetch failed for {uri}: {reason}")]
    FetchFailed { uri: String, reason: String },

    #[error("Unresolvable content type for {uri}: {content_type:?}")]
    UnresolvableContentType {
        uri: String,
        content_type: Option<String>,
    },

    #[error("Relocation failed {from:?} -> {to:?}: {reason}")]
    RelocationFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Key/value store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Operation abandoned before it settled: {key}")]
    Abandoned { key: OperationKey },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

impl CacheError {
    pub fn is_already_in_progress(&self) -> bool {
        matches!(self, CacheError::AlreadyInProgress { .. })
    }

    /// True for I/O errors caused by a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
