use std::{fmt, path::Path, time::SystemTime};

use async_trait::async_trait;

use crate::error::Result;

/// Result of a `stat` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Raw file-system capability consumed by the cache.
///
/// Implementations perform no coordination of their own; route calls through
/// [`GuardedFs`](super::GuardedFs) whenever another task may touch the same
/// path.
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Remove a file, or a directory and everything below it.
    async fn unlink(&self, path: &Path) -> Result<()>;

    async fn mkdir(&self, path: &Path) -> Result<()>;

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            is_file: meta.is_file(),
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    async fn unlink(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            // rename(2) cannot cross file systems; fall back to copy + remove.
            Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {
                tokio::fs::copy(from, to).await?;
                tokio::fs::remove_file(from).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::copy(from, to).await?;
        Ok(())
    }
}
