use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, RunletError};

/// Creates and removes per-request workspace directories.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named directory under the root.
    pub async fn acquire(&self) -> Result<Workspace> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| RunletError::Workspace {
                path: self.root.clone(),
                source,
            })?;

        let path = self.root.join(uuid::Uuid::new_v4().simple().to_string());
        // create_dir (not create_dir_all) fails if the name is somehow taken
        fs::create_dir(&path)
            .await
            .map_err(|source| RunletError::Workspace {
                path: path.clone(),
                source,
            })?;

        debug!(workspace = %path.display(), "Acquired workspace");
        Ok(Workspace {
            path,
            released: false,
        })
    }

    /// Recursively delete a workspace.
    pub async fn release(&self, mut workspace: Workspace) {
        workspace.released = true;
        match fs::remove_dir_all(&workspace.path).await {
            Ok(()) => debug!(workspace = %workspace.path.display(), "Released workspace"),
            Err(e) => warn!(
                workspace = %workspace.path.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

/// An exclusively owned directory for one submission.
///
/// Dropping a workspace that was never released removes it synchronously,
/// so a panicking runner still leaves nothing behind.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Write a file directly inside the workspace.
    pub async fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.file(name);
        fs::write(&path, content).await?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    workspace = %self.path.display(),
                    error = %e,
                    "Failed to remove workspace on drop"
                );
            }
        }
    }
}
