//! # imgstash core
//!
//! On-device caching of remotely fetched images. Each distinct resource is
//! downloaded at most once, even under concurrent requests, and the mapping
//! from resource to local file survives process restarts.
//!
//! ## Architecture
//!
//! - [`orchestration`]: the single-flight [`OperationCoordinator`] that
//!   deduplicates concurrent operations sharing an [`OperationKey`]
//! - [`infra::fs`]: file-system and download capabilities, plus
//!   [`GuardedFs`] which routes every call through the coordinator
//! - [`infra::cache`]: cache key derivation and the persistent
//!   [`CacheIndex`]
//! - [`infra::media`]: the [`ImageFetcher`] (download, stage, relocate) and
//!   the [`CacheStore`] that ties lookup, fetch and commit together
//!
//! ## Example
//!
//! ```no_run
//! use imgstash_core::{CacheStore, StoreSettings};
//!
//! async fn poster() -> imgstash_core::Result<std::path::PathBuf> {
//!     let settings = StoreSettings::new("/tmp/imgstash".into());
//!     let store = CacheStore::open(&settings).await?;
//!     store.resolve("https://example.com/posters/w185/abc.jpg").await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod error;
pub mod infra;
pub mod orchestration;

pub use error::{CacheError, Result};
pub use infra::{
    cache::{
        CacacheKeyValueStore, CacheIndex, CacheKey, IndexRoot, KeyOptions,
        KeyValueStore, MemoryKeyValueStore,
    },
    fs::{
        DownloadOutcome, DownloadRequest, Downloader, FileStat, FileSystem,
        GuardedFs, HttpDownloader, TokioFileSystem,
    },
    media::{CacheStore, ImageFetcher, ResourceFetcher, StoreSettings},
};
pub use orchestration::{
    CoordinatorStats, DedupPolicy, OperationCoordinator, OperationKey,
};
