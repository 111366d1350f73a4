//! The local working tree: exclusive access and file persistence.
//!
//! `git checkout` and `git commit` mutate repository-wide state, so only one
//! logical task may work in the tree at a time. [`WorkspaceLock`] models that
//! explicitly; operations that touch the tree take a [`WorkspaceGuard`] as
//! proof of ownership.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::testing::FileSystem;

/// Mutex of size one over the working tree.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLock {
    inner: Arc<Mutex<()>>,
}

/// Held while a task owns the working tree.
#[derive(Debug)]
pub struct WorkspaceGuard {
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the tree is free and take it.
    pub async fn acquire(&self) -> WorkspaceGuard {
        let guard = self.inner.clone().lock_owned().await;
        debug!("Workspace acquired");
        WorkspaceGuard { _guard: guard }
    }

    /// Take the tree if nobody holds it.
    pub fn try_acquire(&self) -> Option<WorkspaceGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| WorkspaceGuard { _guard: guard })
    }
}

/// Tokio-backed file system rooted at the project directory.
#[derive(Debug, Clone)]
pub struct RealFileSystem {
    base_path: PathBuf,
}

impl RealFileSystem {
    #[must_use]
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Resolve a path relative to the base path.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl FileSystem for RealFileSystem {
    async fn read_file(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(self.resolve(path)).await
    }

    async fn write_file(&self, path: &Path, content: &str) -> std::io::Result<()> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&full_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        debug!("Wrote {} ({} bytes)", full_path.display(), content.len());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(self.resolve(path))
            .await
            .unwrap_or(false)
    }
}
