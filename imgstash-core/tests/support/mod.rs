#![allow(dead_code)]

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use imgstash_core::{
    CacheError, CacheIndex, CacheKey, CacheStore, DedupPolicy,
    DownloadOutcome, DownloadRequest, Downloader, FileStat, FileSystem,
    GuardedFs, ImageFetcher, KeyValueStore, MemoryKeyValueStore,
    OperationCoordinator, ResourceFetcher, Result, TokioFileSystem,
};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SCENARIO_URL: &str = "https://example.com/a/b.bin";
pub const SCENARIO_KEY: &str = "68200f895e477b926a1eb8f37969b80cfdcc4cb3";

/// What the fake server answers on the next download.
#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Write half the body, then fail like a dropped connection.
    pub drop_connection: bool,
}

impl FakeResponse {
    pub fn png(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: Some("image/png".into()),
            body: body.to_vec(),
            drop_connection: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: Some("text/html".into()),
            body: Vec::new(),
            drop_connection: false,
        }
    }
}

/// In-process [`Downloader`] that writes a scripted response to disk.
#[derive(Debug)]
pub struct FakeDownloader {
    response: Mutex<FakeResponse>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn new(response: FakeResponse) -> Self {
        Self {
            response: Mutex::new(response),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every download waits for `gate` to be notified before answering.
    pub fn gated(response: FakeResponse, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(response)
        }
    }

    pub fn respond_with(&self, response: FakeResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download_file(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let response = self.response.lock().unwrap().clone();
        if response.drop_connection {
            let half = &response.body[..response.body.len() / 2];
            tokio::fs::write(&request.destination, half).await?;
            return Err(CacheError::FetchFailed {
                uri: request.source_uri.clone(),
                reason: "connection reset".into(),
            });
        }

        let success = (200..300).contains(&response.status);
        if success {
            tokio::fs::write(&request.destination, &response.body).await?;
        }
        Ok(DownloadOutcome {
            status: response.status,
            content_type: response.content_type,
            bytes_written: if success {
                response.body.len() as u64
            } else {
                0
            },
        })
    }
}

/// Fetcher for cache-hit tests: any call is a test failure.
#[derive(Debug, Default)]
pub struct UnreachableFetcher;

#[async_trait]
impl ResourceFetcher for UnreachableFetcher {
    async fn fetch(&self, uri: &str, _key: &CacheKey) -> Result<PathBuf> {
        panic!("fetcher must not be called on a cache hit (uri={uri})");
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub cache_dir: PathBuf,
    pub downloader: Arc<FakeDownloader>,
    pub kv: Arc<dyn KeyValueStore>,
    pub fs: GuardedFs,
    pub fetcher: ImageFetcher,
    pub store: CacheStore,
}

impl Harness {
    pub async fn new(policy: DedupPolicy, downloader: FakeDownloader) -> Self {
        Self::with_kv(policy, downloader, Arc::new(MemoryKeyValueStore::new()))
            .await
    }

    pub async fn with_kv(
        policy: DedupPolicy,
        downloader: FakeDownloader,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_parts(policy, downloader, kv, Arc::new(TokioFileSystem))
            .await
    }

    pub async fn with_fs(
        policy: DedupPolicy,
        downloader: FakeDownloader,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self::with_parts(
            policy,
            downloader,
            Arc::new(MemoryKeyValueStore::new()),
            fs,
        )
        .await
    }

    pub async fn with_parts(
        policy: DedupPolicy,
        downloader: FakeDownloader,
        kv: Arc<dyn KeyValueStore>,
        raw_fs: Arc<dyn FileSystem>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("images");
        let downloader = Arc::new(downloader);
        let fs = GuardedFs::new(
            OperationCoordinator::new(policy),
            raw_fs,
            downloader.clone(),
        );
        let fetcher = ImageFetcher::new(fs.clone(), cache_dir.clone());
        fetcher.ensure_cache_dir().await.unwrap();
        let store = CacheStore::new(
            CacheIndex::new(Arc::clone(&kv)),
            Arc::new(fetcher.clone()),
            fs.clone(),
        );

        Self {
            dir,
            cache_dir,
            downloader,
            kv,
            fs,
            fetcher,
            store,
        }
    }

    pub fn scenario_key() -> CacheKey {
        CacheKey::from_canonical("/a/b.bin")
    }

    pub fn path_in_cache(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }
}

/// Memory store that can hold the next `get_item` after reading its value,
/// so a caller observes a miss that goes stale while it waits.
#[derive(Debug, Default)]
pub struct ParkingKv {
    inner: MemoryKeyValueStore,
    park_next_get: AtomicBool,
    pub parked: Notify,
    pub release: Notify,
}

impl ParkingKv {
    pub fn park_next_get(&self) {
        self.park_next_get.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for ParkingKv {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self.inner.get_item(key).await?;
        if self.park_next_get.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_item(key, value).await
    }
}

/// Store whose reads and/or writes fail as if the backing disk went away.
#[derive(Debug, Default)]
pub struct BrokenKv {
    pub fail_get: bool,
    pub fail_set: bool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    inner: MemoryKeyValueStore,
}

impl BrokenKv {
    pub fn failing_reads() -> Self {
        Self {
            fail_get: true,
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_set: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl KeyValueStore for BrokenKv {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(CacheError::StoreUnavailable("index offline".into()));
        }
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set {
            return Err(CacheError::StoreUnavailable("index read-only".into()));
        }
        self.inner.set_item(key, value).await
    }
}

/// Real file system with two knobs: hold the next `stat`, or fail every move.
#[derive(Debug, Default)]
pub struct ScriptedFs {
    inner: TokioFileSystem,
    park_next_stat: AtomicBool,
    pub fail_moves: AtomicBool,
    pub parked: Notify,
    pub release: Notify,
}

impl ScriptedFs {
    pub fn park_next_stat(&self) {
        self.park_next_stat.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileSystem for ScriptedFs {
    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        if self.park_next_stat.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.stat(path).await
    }

    async fn unlink(&self, path: &Path) -> Result<()> {
        self.inner.unlink(path).await
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        self.inner.mkdir(path).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(io::Error::other("no space left on device").into());
        }
        self.inner.move_file(from, to).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy_file(from, to).await
    }
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap()
}
