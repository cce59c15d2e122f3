use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    error::{CacheError, Result},
    infra::{
        cache::CacheKey,
        fs::{DownloadRequest, GuardedFs},
    },
};

/// Produces the final local path of a remote resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, uri: &str, key: &CacheKey) -> Result<PathBuf>;
}

/// Downloads into `<cache_dir>/<key>`, then relocates the staged file to
/// `<cache_dir>/<key>.<suffix>`, where the suffix comes from the response's
/// `Content-Type`.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    fs: GuardedFs,
    cache_dir: PathBuf,
    fallback_suffix: Option<String>,
}

impl ImageFetcher {
    pub fn new(fs: GuardedFs, cache_dir: PathBuf) -> Self {
        Self {
            fs,
            cache_dir,
            fallback_suffix: None,
        }
    }

    /// Use `suffix` when the response carries no usable `Content-Type`
    /// instead of failing the fetch.
    pub fn with_fallback_suffix(mut self, suffix: Option<String>) -> Self {
        self.fallback_suffix = suffix;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn staged_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    pub async fn ensure_cache_dir(&self) -> Result<()> {
        self.fs.mkdir(&self.cache_dir).await
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        let relocation_failed = |err: CacheError| match err {
            CacheError::AlreadyInProgress { .. } => err,
            other => CacheError::RelocationFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                reason: other.to_string(),
            },
        };

        self.fs
            .delete_if_exists(to)
            .await
            .map_err(relocation_failed)?;
        self.fs.move_file(from, to).await.map_err(relocation_failed)
    }

    /// Best-effort removal of a staged download.
    async fn discard_staged(&self, staged: &Path) {
        if let Err(err) = self.fs.delete_if_exists(staged).await {
            warn!(
                "failed to remove staged download {}: {}",
                staged.display(),
                err
            );
        }
    }
}

#[async_trait]
impl ResourceFetcher for ImageFetcher {
    async fn fetch(&self, uri: &str, key: &CacheKey) -> Result<PathBuf> {
        let staged = self.staged_path(key);
        info!("fetching {} -> {}", uri, staged.display());

        let request = DownloadRequest {
            source_uri: uri.to_string(),
            destination: staged.clone(),
        };
        let outcome = match self.fs.download_file(request).await {
            Ok(outcome) => outcome,
            // Someone else owns the staged file right now; leave it alone.
            Err(err @ CacheError::AlreadyInProgress { .. }) => return Err(err),
            Err(err) => {
                self.discard_staged(&staged).await;
                return Err(match err {
                    CacheError::FetchFailed { .. } => err,
                    other => CacheError::FetchFailed {
                        uri: uri.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        if !outcome.is_success() {
            self.discard_staged(&staged).await;
            return Err(CacheError::FetchFailed {
                uri: uri.to_string(),
                reason: format!("unexpected HTTP status {}", outcome.status),
            });
        }

        let suffix = match content_type_suffix(outcome.content_type.as_deref())
            .or_else(|| self.fallback_suffix.clone())
        {
            Some(suffix) => suffix,
            None => {
                self.discard_staged(&staged).await;
                return Err(CacheError::UnresolvableContentType {
                    uri: uri.to_string(),
                    content_type: outcome.content_type,
                });
            }
        };

        let final_path = suffixed_path(&staged, &suffix);
        if let Err(err) = self.relocate(&staged, &final_path).await {
            if !err.is_already_in_progress() {
                self.discard_staged(&staged).await;
            }
            return Err(err);
        }

        info!("cached {} at {}", uri, final_path.display());
        Ok(final_path)
    }
}

/// File suffix for a `Content-Type` value: the subtype after the last `/`,
/// without parameters, lowercased. `None` when absent or malformed.
pub fn content_type_suffix(content_type: Option<&str>) -> Option<String> {
    let media_type = content_type?.split(';').next()?.trim();
    let (_, subtype) = media_type.rsplit_once('/')?;
    let subtype = subtype.trim().to_ascii_lowercase();

    let well_formed = subtype
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    well_formed.then_some(subtype)
}

fn suffixed_path(staged: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(staged.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
