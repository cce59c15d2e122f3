use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use super::{cache_key::CacheKey, kv_store::KeyValueStore};
use crate::error::{CacheError, Result};

const INDEX_KEY_PREFIX: &str = "images/v1/index/";

/// Storage key under which the index keeps the path for `key`.
///
/// Versioned so a future layout change can live next to the old one.
pub fn index_key_for(key: &CacheKey) -> String {
    let mut string =
        String::with_capacity(INDEX_KEY_PREFIX.len() + key.as_str().len());
    string.push_str(INDEX_KEY_PREFIX);
    string.push_str(key.as_str());
    string
}

/// Persistent `CacheKey -> local path` mapping.
///
/// Removal writes an empty value instead of deleting the record; `get` treats
/// empty and missing the same way.
#[derive(Clone, Debug)]
pub struct CacheIndex {
    store: Arc<dyn KeyValueStore>,
}

impl CacheIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        let stored = self.store.get_item(&index_key_for(key)).await?;
        Ok(stored.filter(|path| !path.is_empty()).map(PathBuf::from))
    }

    pub async fn put(&self, key: &CacheKey, path: &Path) -> Result<()> {
        let value = path.to_str().ok_or_else(|| {
            CacheError::Internal(format!(
                "cache path is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        debug!("index put: key={}, path={}", key, value);
        self.store.set_item(&index_key_for(key), value).await
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<()> {
        debug!("index remove: key={}", key);
        self.store.set_item(&index_key_for(key), "").await
    }
}
