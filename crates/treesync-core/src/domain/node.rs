//! Tracked file entity and its status enums

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Local content status of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Content matches what was last reconciled
    Unmodified,
    /// Content changed since the last successful upload
    Modified,
}

impl FileStatus {
    /// Stable string form used by the persistence layer
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Unmodified => "unmodified",
            FileStatus::Modified => "modified",
        }
    }
}

/// Remote replication status of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// The current content exists in the remote mirror
    Uploaded,
    /// The current content has not been replicated yet
    NotUploaded,
}

impl UploadStatus {
    /// Stable string form used by the persistence layer
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::NotUploaded => "not_uploaded",
        }
    }
}

/// One filesystem leaf selected for tracking
///
/// The absolute path is the entity's identity; it is unique across the
/// working set and the persisted rows. A node is created when the scanner
/// or an event handler first observes the path under a watched root, and
/// destroyed when the path disappears or an ancestor root is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Database row id; 0 until first persisted
    pub id: i64,
    /// Display name (final path component)
    pub name: String,
    /// Always false for nodes; directories become [`WatchRoot`]s
    ///
    /// [`WatchRoot`]: super::WatchRoot
    pub is_dir: bool,
    /// Local content status
    pub file_status: FileStatus,
    /// Remote replication status
    pub upload_status: UploadStatus,
    /// Unique identity of the node
    pub absolute_path: PathBuf,
}

impl Node {
    /// Create a freshly observed file node: `{modified, not_uploaded}`
    ///
    /// This is the state every node enters the system in, so that the next
    /// add-nodes reconciliation pass picks it up for upload.
    pub fn observed(path: &Path) -> Self {
        Self {
            id: 0,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            is_dir: false,
            file_status: FileStatus::Modified,
            upload_status: UploadStatus::NotUploaded,
            absolute_path: path.to_path_buf(),
        }
    }

    /// Transition after a content-change event
    pub fn mark_modified(&mut self) {
        self.file_status = FileStatus::Modified;
        self.upload_status = UploadStatus::NotUploaded;
    }

    /// Transition after a successful remote upload
    pub fn mark_uploaded(&mut self) {
        self.file_status = FileStatus::Unmodified;
        self.upload_status = UploadStatus::Uploaded;
    }

    /// True if the node's content still needs replication
    pub fn needs_upload(&self) -> bool {
        self.upload_status == UploadStatus::NotUploaded
            || self.file_status == FileStatus::Modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_node_starts_dirty() {
        let node = Node::observed(Path::new("/data/a.txt"));
        assert_eq!(node.name, "a.txt");
        assert!(!node.is_dir);
        assert_eq!(node.file_status, FileStatus::Modified);
        assert_eq!(node.upload_status, UploadStatus::NotUploaded);
        assert!(node.needs_upload());
    }

    #[test]
    fn test_upload_then_modify_cycle() {
        let mut node = Node::observed(Path::new("/data/a.txt"));
        node.mark_uploaded();
        assert_eq!(node.file_status, FileStatus::Unmodified);
        assert_eq!(node.upload_status, UploadStatus::Uploaded);
        assert!(!node.needs_upload());

        node.mark_modified();
        assert!(node.needs_upload());
    }
}
