use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use super::image_fetcher::{ImageFetcher, ResourceFetcher};
use crate::{
    error::Result,
    infra::{
        cache::{
            CacacheKeyValueStore, CacheIndex, CacheKey, IndexRoot, KeyOptions,
        },
        fs::{GuardedFs, HttpDownloader, TokioFileSystem},
    },
    orchestration::{DedupPolicy, OperationCoordinator, OperationKey},
};

/// Everything needed to assemble a [`CacheStore`] over the real file system,
/// `reqwest` and a `cacache` index.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
    pub key_options: KeyOptions,
    pub dedup_policy: DedupPolicy,
    pub fallback_suffix: Option<String>,
    pub verify_on_hit: bool,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl StoreSettings {
    pub fn new(cache_dir: PathBuf) -> Self {
        let index_dir = cache_dir.join("index");
        Self {
            cache_dir,
            index_dir,
            key_options: KeyOptions::default(),
            dedup_policy: DedupPolicy::default(),
            fallback_suffix: None,
            verify_on_hit: false,
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("imgstash/", env!("CARGO_PKG_VERSION"))
                .to_string(),
        }
    }
}

/// Public read path: "give me the local file for this URL, fetching it if
/// necessary".
///
/// The store keeps no mapping in memory; every lookup goes through the
/// [`CacheIndex`]. Misses are fetched through the coordinator keyed by the
/// cache key, so concurrent misses for one resource download it once.
#[derive(Clone)]
pub struct CacheStore {
    index: CacheIndex,
    fetcher: Arc<dyn ResourceFetcher>,
    fs: GuardedFs,
    key_options: KeyOptions,
    verify_on_hit: bool,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("index", &self.index)
            .field("fetcher", &self.fetcher)
            .field("coordinator", self.fs.coordinator())
            .field("key_options", &self.key_options)
            .field("verify_on_hit", &self.verify_on_hit)
            .finish()
    }
}

impl CacheStore {
    pub fn new(
        index: CacheIndex,
        fetcher: Arc<dyn ResourceFetcher>,
        fs: GuardedFs,
    ) -> Self {
        Self {
            index,
            fetcher,
            fs,
            key_options: KeyOptions::default(),
            verify_on_hit: false,
        }
    }

    pub fn with_key_options(mut self, key_options: KeyOptions) -> Self {
        self.key_options = key_options;
        self
    }

    /// Stat the indexed file on every hit and refetch when it is gone.
    pub fn with_verify_on_hit(mut self, verify_on_hit: bool) -> Self {
        self.verify_on_hit = verify_on_hit;
        self
    }

    /// Build a store over the real file system, network and on-disk index,
    /// creating the cache directory if needed.
    pub async fn open(settings: &StoreSettings) -> Result<Self> {
        let coordinator = OperationCoordinator::new(settings.dedup_policy);
        let downloader = HttpDownloader::new(
            settings.request_timeout,
            &settings.user_agent,
        )?;
        let fs = GuardedFs::new(
            coordinator,
            Arc::new(TokioFileSystem),
            Arc::new(downloader),
        );

        let fetcher = ImageFetcher::new(fs.clone(), settings.cache_dir.clone())
            .with_fallback_suffix(settings.fallback_suffix.clone());
        fetcher.ensure_cache_dir().await?;

        let index = CacheIndex::new(Arc::new(CacacheKeyValueStore::new(
            IndexRoot::new(settings.index_dir.clone()),
        )));

        info!(
            "cache store ready: cache_dir={}, index_dir={}, policy={:?}",
            settings.cache_dir.display(),
            settings.index_dir.display(),
            settings.dedup_policy
        );

        Ok(Self::new(index, Arc::new(fetcher), fs)
            .with_key_options(settings.key_options)
            .with_verify_on_hit(settings.verify_on_hit))
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn coordinator(&self) -> &OperationCoordinator {
        self.fs.coordinator()
    }

    pub fn key_for(&self, uri: &str) -> Result<CacheKey> {
        CacheKey::from_uri(uri, self.key_options)
    }

    /// Local path for `uri`, downloading it on a miss.
    ///
    /// Failures propagate unchanged and never touch the index, so the next
    /// call retries from scratch.
    pub async fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let key = self.key_for(uri)?;

        if let Some(path) = self.indexed_path(&key).await? {
            debug!("cache hit: uri={}, key={}", uri, key);
            return Ok(path);
        }

        debug!("cache miss: uri={}, key={}", uri, key);
        let this = self.clone();
        let uri = uri.to_string();
        self.coordinator()
            .submit(OperationKey::new(key.as_str(), "fetch"), move || {
                async move {
                    // A fetch that settled after our miss may already have
                    // committed this key.
                    if let Some(path) = this.indexed_path(&key).await? {
                        debug!("committed while queued: key={}", key);
                        return Ok(path);
                    }
                    let path = this.fetcher.fetch(&uri, &key).await?;
                    this.index.put(&key, &path).await?;
                    Ok(path)
                }
            })
            .await
    }

    /// Index-only lookup; never touches the network.
    ///
    /// Meant for callers that already know they are offline and want to
    /// degrade to whatever is on disk.
    pub async fn lookup(&self, uri: &str) -> Result<Option<PathBuf>> {
        let key = self.key_for(uri)?;
        self.index.get(&key).await
    }

    /// Forget `uri`: remove its file (best-effort) and clear the index entry.
    pub async fn delete(&self, uri: &str) -> Result<()> {
        let key = self.key_for(uri)?;

        if let Some(path) = self.index.get(&key).await? {
            if let Err(err) = self.fs.delete_if_exists(&path).await {
                warn!(
                    "failed to remove cached file {} for {}: {}",
                    path.display(),
                    uri,
                    err
                );
            }
        }

        self.index.remove(&key).await
    }

    async fn indexed_path(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        let Some(path) = self.index.get(key).await? else {
            return Ok(None);
        };
        if !self.verify_on_hit {
            return Ok(Some(path));
        }

        match self.fs.stat(&path).await {
            Ok(stat) if stat.is_file => Ok(Some(path)),
            Ok(_) => {
                warn!("indexed path is not a file: {}", path.display());
                Ok(None)
            }
            Err(err) if err.is_not_found() => {
                debug!("indexed file missing, refetching: {}", path.display());
                Ok(None)
            }
            // Another task is checking the same file; the entry stands.
            Err(err) if err.is_already_in_progress() => Ok(Some(path)),
            Err(err) => Err(err),
        }
    }
}
