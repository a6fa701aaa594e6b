//! Directory tree scanning
//!
//! Walks a directory tree and registers what it finds in the working set:
//! every directory (including empty ones) becomes a watch root, every
//! visible file becomes a tracked node. Hidden entries (any segment
//! starting with `.`) are skipped along with everything below them; an
//! explicitly requested hidden root is an error the caller must surface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use treesync_core::domain::{is_hidden, DomainError, Node, WatchRoot};

use crate::working_set::WorkingSet;

/// Walks directory trees into the working set
#[derive(Clone)]
pub struct TreeScanner {
    set: WorkingSet,
}

impl TreeScanner {
    pub fn new(set: WorkingSet) -> Self {
        Self { set }
    }

    /// Scans the tree rooted at `root` into the working set
    ///
    /// Fails with [`DomainError::HiddenPath`] when the root itself is
    /// hidden, or with an I/O error when the root cannot be listed. Hidden
    /// entries and unreadable subdirectories found during the descent only
    /// prune their own subtree.
    pub async fn scan(&self, root: &Path) -> Result<()> {
        if is_hidden(root) {
            return Err(DomainError::HiddenPath(root.to_path_buf()).into());
        }

        let metadata = tokio::fs::metadata(root)
            .await
            .with_context(|| format!("Cannot stat scan root {}", root.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Scan root {} is not a directory", root.display());
        }

        debug!(root = %root.display(), "Scanning directory tree");

        let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            self.set.insert_root(WatchRoot::observed(&dir)).await?;

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    // The root was listable; deeper failures prune only
                    // their own subtree
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("Failed reading entries of {}", dir.display()))?
            {
                let path = entry.path();
                if is_hidden(&path) {
                    debug!(path = %path.display(), "Skipping hidden entry");
                    continue;
                }

                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(e) => {
                        // Vanished between listing and stat
                        debug!(path = %path.display(), error = %e, "Entry gone during scan");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if self.set.get_node(&path).await?.is_none() {
                        self.set.insert_node(Node::observed(&path)).await?;
                    }
                }
                // Symlinks and special files are not tracked
            }
        }

        Ok(())
    }
}
