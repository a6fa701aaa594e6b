//! Watched directory entity

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::RemoteId;

/// A directory registered for change notification
///
/// Created when a directory is discovered, either explicitly requested over
/// IPC or found while traversing another root. Every directory under a
/// watched tree becomes its own root so that creations inside it are seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRoot {
    /// Database row id; 0 until first persisted
    pub id: i64,
    /// Display name (final path component)
    pub name: String,
    /// Unique identity of the root
    pub absolute_path: PathBuf,
    /// Remote folder backing this directory, once mirrored
    pub remote_id: Option<RemoteId>,
}

impl WatchRoot {
    /// Create a freshly observed directory root
    pub fn observed(path: &Path) -> Self {
        Self {
            id: 0,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            absolute_path: path.to_path_buf(),
            remote_id: None,
        }
    }
}
