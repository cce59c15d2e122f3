use std::{
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CacheError, Result};

/// Durable string key/value capability backing the cache index.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// Root directory managed by `cacache` (index + content-addressed blobs).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IndexRoot(PathBuf);

impl IndexRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for IndexRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexRoot").field(&self.0).finish()
    }
}

/// A thin typed wrapper over `cacache` that survives process restarts.
///
/// Values are stored JSON-encoded so that the empty string (the cache index's
/// "removed" marker) still round-trips as a non-empty blob.
#[derive(Clone, Debug)]
pub struct CacacheKeyValueStore {
    root: IndexRoot,
}

impl CacacheKeyValueStore {
    pub fn new(root: IndexRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &IndexRoot {
        &self.root
    }
}

#[async_trait]
impl KeyValueStore for CacacheKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let bytes = match cacache::read(self.root.as_path(), key).await {
            Ok(bytes) => bytes,
            Err(cacache::Error::EntryNotFound(_, _)) => return Ok(None),
            Err(cacache::Error::IntegrityError(err)) => {
                return Err(CacheError::StoreUnavailable(format!(
                    "index entry failed integrity check: {key} ({err})"
                )));
            }
            Err(cacache::Error::SizeMismatch(wanted, actual)) => {
                return Err(CacheError::StoreUnavailable(format!(
                    "index entry size mismatch: key={key}, wanted={wanted}, actual={actual}"
                )));
            }
            Err(cacache::Error::IoError(_, msg)) => {
                return Err(CacheError::StoreUnavailable(format!(
                    "cacache read I/O error: {msg}"
                )));
            }
            Err(cacache::Error::SerdeError(_, msg)) => {
                return Err(CacheError::StoreUnavailable(format!(
                    "cacache read serde error: {msg}"
                )));
            }
        };

        serde_json::from_slice::<String>(&bytes).map(Some).map_err(|e| {
            CacheError::StoreUnavailable(format!(
                "index entry is not a valid string value: {key} ({e})"
            ))
        })
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let encoded = serde_json::to_vec(value).map_err(|e| {
            CacheError::StoreUnavailable(format!(
                "failed to encode index value: {e}"
            ))
        })?;
        cacache::write(self.root.as_path(), key, encoded)
            .await
            .map(|_| ())
            .map_err(|e| {
                CacheError::StoreUnavailable(format!(
                    "cacache write failed: {e}"
                ))
            })
    }
}

/// Process-lifetime store; handy for tests and callers that do not need the
/// index to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
