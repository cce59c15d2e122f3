use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use super::{
    download::{DownloadOutcome, DownloadRequest, Downloader},
    primitives::{FileStat, FileSystem},
};
use crate::{
    error::Result,
    orchestration::{OperationCoordinator, OperationKey},
};

/// File-system and download primitives routed through the
/// [`OperationCoordinator`].
///
/// Single-path operations are keyed by the path, move/copy by the
/// `from_to` pair, downloads by the source URI.
#[derive(Clone)]
pub struct GuardedFs {
    coordinator: OperationCoordinator,
    fs: Arc<dyn FileSystem>,
    downloader: Arc<dyn Downloader>,
}

impl fmt::Debug for GuardedFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedFs")
            .field("coordinator", &self.coordinator)
            .field("fs", &self.fs)
            .field("downloader", &self.downloader)
            .finish()
    }
}

impl GuardedFs {
    pub fn new(
        coordinator: OperationCoordinator,
        fs: Arc<dyn FileSystem>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            coordinator,
            fs,
            downloader,
        }
    }

    pub fn coordinator(&self) -> &OperationCoordinator {
        &self.coordinator
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        self.coordinator
            .submit(OperationKey::for_path(&path, "exists"), move || {
                async move { fs.exists(&path).await }
            })
            .await
    }

    pub async fn stat(&self, path: &Path) -> Result<FileStat> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        self.coordinator
            .submit(OperationKey::for_path(&path, "stat"), move || {
                async move { fs.stat(&path).await }
            })
            .await
    }

    pub async fn unlink(&self, path: &Path) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        self.coordinator
            .submit(OperationKey::for_path(&path, "unlink"), move || {
                async move { fs.unlink(&path).await }
            })
            .await
    }

    pub async fn mkdir(&self, path: &Path) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let path = path.to_path_buf();
        self.coordinator
            .submit(OperationKey::for_path(&path, "mkdir"), move || {
                async move { fs.mkdir(&path).await }
            })
            .await
    }

    pub async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        self.coordinator
            .submit(OperationKey::for_pair(&from, &to, "move_file"), move || {
                async move { fs.move_file(&from, &to).await }
            })
            .await
    }

    pub async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        self.coordinator
            .submit(OperationKey::for_pair(&from, &to, "copy_file"), move || {
                async move { fs.copy_file(&from, &to).await }
            })
            .await
    }

    pub async fn download_file(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadOutcome> {
        let downloader = Arc::clone(&self.downloader);
        let key = OperationKey::new(&request.source_uri, "download_file");
        self.coordinator
            .submit(key, move || async move {
                downloader.download_file(&request).await
            })
            .await
    }

    /// Remove `path` if something is there. A file vanishing between the
    /// existence check and the unlink counts as removed.
    pub async fn delete_if_exists(&self, path: &Path) -> Result<()> {
        let this = self.clone();
        let path: PathBuf = path.to_path_buf();
        let key = OperationKey::for_path(&path, "delete_if_exists");
        self.coordinator
            .submit(key, move || async move {
                if !this.exists(&path).await? {
                    return Ok(());
                }
                match this.unlink(&path).await {
                    Err(err) if err.is_not_found() => {
                        debug!("already gone: {}", path.display());
                        Ok(())
                    }
                    other => other,
                }
            })
            .await
    }
}
