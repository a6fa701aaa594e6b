//! D-Bus service implementation for TreeSync
//!
//! Provides the `io.treesync.TreeSync1` interface the CLI talks to:
//! saving and reading the credential, listing what is currently tracked,
//! and adding directories to the watch list. Additions are validated and
//! scanned here; the reconciler picks the new entries up through the
//! action queue like any other change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use treesync_core::domain::{Credential, FileStatus, UploadStatus};
use treesync_core::ports::IStateStore;
use treesync_engine::queue::{Action, ActionQueue};
use treesync_engine::scanner::TreeScanner;
use treesync_engine::working_set::WorkingSet;

/// D-Bus well-known name for the TreeSync daemon
pub const DBUS_NAME: &str = "io.treesync.TreeSync1";

/// D-Bus object path for the service
pub const DBUS_PATH: &str = "/io/treesync/TreeSync1";

// ============================================================================
// Response shapes
// ============================================================================

/// Per-path outcome of an add-directories request
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AddOutcome {
    /// `complete`, `partial`, or `failed`
    pub status: &'static str,
    /// Empty on success, the failure reason otherwise
    pub error: String,
    /// The path the outcome is about
    pub path: String,
}

/// One watched directory in a `GetWatchList` response
#[derive(Debug, Serialize)]
pub struct WatchedDirectory {
    /// Display name (final path component)
    pub name: String,
    /// Absolute path of the directory
    pub absolute_path: String,
}

/// One tracked file in a `GetWatchList` response
#[derive(Debug, Serialize)]
pub struct WatchedFile {
    /// Display name (final path component)
    pub name: String,
    /// Absolute path of the file
    pub absolute_path: String,
    /// Local content status
    pub file_status: FileStatus,
    /// Remote replication status
    pub upload_status: UploadStatus,
}

/// Complete `GetWatchList` response
#[derive(Debug, Serialize)]
struct WatchListResponse {
    directories: Vec<WatchedDirectory>,
    files: Vec<WatchedFile>,
}

impl AddOutcome {
    fn complete(path: &Path) -> Self {
        Self {
            status: "complete",
            error: String::new(),
            path: path.display().to_string(),
        }
    }

    fn partial(path: &Path, error: String) -> Self {
        Self {
            status: "partial",
            error,
            path: path.display().to_string(),
        }
    }

    fn failed(path: &Path, error: String) -> Self {
        Self {
            status: "failed",
            error,
            path: path.display().to_string(),
        }
    }
}

// ============================================================================
// TreeSync interface
// ============================================================================

/// The daemon's single D-Bus interface
pub struct TreeSyncInterface {
    store: Arc<dyn IStateStore>,
    set: WorkingSet,
    scanner: TreeScanner,
    queue: Arc<ActionQueue>,
}

impl TreeSyncInterface {
    pub fn new(
        store: Arc<dyn IStateStore>,
        set: WorkingSet,
        scanner: TreeScanner,
        queue: Arc<ActionQueue>,
    ) -> Self {
        Self {
            store,
            set,
            scanner,
            queue,
        }
    }
}

#[zbus::interface(name = "io.treesync.TreeSync1")]
impl TreeSyncInterface {
    /// Returns the saved credential value, or an empty string
    async fn get_token(&self) -> String {
        match self.store.get_credential().await {
            Ok(Some(credential)) => credential.value,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read credential");
                String::new()
            }
        }
    }

    /// Saves the credential value, creating or replacing the singleton row
    ///
    /// Bootstrap folder ids already recorded on the row are kept; only the
    /// token value changes. The remote connection is picked up on the next
    /// daemon start.
    async fn save_token(&self, token: String) -> bool {
        let credential = match self.store.get_credential().await {
            Ok(Some(mut existing)) => {
                existing.value = token;
                existing
            }
            Ok(None) => Credential::new(token),
            Err(e) => {
                warn!(error = %e, "Failed to read credential before save");
                return false;
            }
        };

        match self.store.save_credential(&credential).await {
            Ok(()) => {
                info!("Credential saved");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to save credential");
                false
            }
        }
    }

    /// Returns the tracked directories and files as one JSON object
    ///
    /// Both lists come from a single working-set snapshot, so they are
    /// consistent with each other. Directories carry name and path; files
    /// additionally carry their content and replication status.
    async fn get_watch_list(&self) -> String {
        let snapshot = match self.set.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to snapshot working set");
                return r#"{"directories":[],"files":[]}"#.to_string();
            }
        };

        let mut directories: Vec<WatchedDirectory> = snapshot
            .roots
            .values()
            .map(|root| WatchedDirectory {
                name: root.name.clone(),
                absolute_path: root.absolute_path.display().to_string(),
            })
            .collect();
        let mut files: Vec<WatchedFile> = snapshot
            .nodes
            .values()
            .map(|node| WatchedFile {
                name: node.name.clone(),
                absolute_path: node.absolute_path.display().to_string(),
                file_status: node.file_status,
                upload_status: node.upload_status,
            })
            .collect();
        directories.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        files.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));

        let response = WatchListResponse { directories, files };
        serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"directories":[],"files":[]}"#.to_string())
    }

    /// Adds directories to the watch list, returning per-path outcomes
    ///
    /// Each outcome is `complete` (scanned in full), `partial` (the path
    /// exists but its scan failed partway), or `failed` (the path is
    /// missing or not a directory; the error says why). Accepted paths
    /// enqueue add-watchlist and add-nodes so the reconciler persists,
    /// watches, and mirrors them.
    async fn add_directories_to_watch_list(&self, paths: Vec<String>) -> String {
        let mut outcomes = Vec::with_capacity(paths.len());
        let mut accepted = false;

        for raw in paths {
            let path = PathBuf::from(&raw);
            outcomes.push(self.add_one(&path, &mut accepted).await);
        }

        if accepted {
            self.queue.submit(Action::AddWatchlist);
            self.queue.submit(Action::AddNodes);
        }

        serde_json::to_string(&outcomes).unwrap_or_else(|_| "[]".to_string())
    }
}

impl TreeSyncInterface {
    async fn add_one(&self, path: &Path, accepted: &mut bool) -> AddOutcome {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rejecting missing watch path");
                return AddOutcome::failed(path, format!("cannot stat path: {e}"));
            }
        };
        if !metadata.is_dir() {
            return AddOutcome::failed(path, "not a directory".to_string());
        }

        *accepted = true;
        match self.scanner.scan(path).await {
            Ok(()) => {
                info!(path = %path.display(), "Directory added to watch list");
                AddOutcome::complete(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Scan failed partway");
                AddOutcome::partial(path, e.to_string())
            }
        }
    }
}

// ============================================================================
// DbusService - service orchestrator
// ============================================================================

/// Owns the session-bus connection and the registered interface
///
/// The returned connection must be kept alive for the service to stay
/// registered; the well-known name doubles as a single-instance lock.
pub struct DbusService {
    interface: Option<TreeSyncInterface>,
}

impl DbusService {
    pub fn new(interface: TreeSyncInterface) -> Self {
        Self {
            interface: Some(interface),
        }
    }

    /// Starts the service on the session bus
    ///
    /// # Errors
    /// Fails when the session bus is unavailable or the well-known name is
    /// already owned by another daemon instance.
    pub async fn start(&mut self) -> anyhow::Result<zbus::Connection> {
        info!("Starting D-Bus service on session bus");

        let interface = self
            .interface
            .take()
            .ok_or_else(|| anyhow::anyhow!("D-Bus service already started"))?;

        let connection = zbus::connection::Builder::session()?
            .name(DBUS_NAME)?
            .serve_at(DBUS_PATH, interface)?
            .build()
            .await?;

        info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service started");
        Ok(connection)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use treesync_store::{DatabasePool, SqliteStateStore};

    // Default tempdir names start with a dot and would trip the hidden
    // rule; use a visible prefix
    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("treesync-test")
            .tempdir()
            .unwrap()
    }

    async fn make_interface() -> (TreeSyncInterface, Arc<dyn IStateStore>, Arc<ActionQueue>) {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));
        let set = WorkingSet::spawn();
        let scanner = TreeScanner::new(set.clone());
        let queue = Arc::new(ActionQueue::new(16));
        let interface = TreeSyncInterface::new(
            Arc::clone(&store),
            set,
            scanner,
            Arc::clone(&queue),
        );
        (interface, store, queue)
    }

    #[test]
    fn test_dbus_constants() {
        assert_eq!(DBUS_NAME, "io.treesync.TreeSync1");
        assert_eq!(DBUS_PATH, "/io/treesync/TreeSync1");
    }

    #[tokio::test]
    async fn test_get_token_empty_without_credential() {
        let (interface, _store, _queue) = make_interface().await;
        assert_eq!(interface.get_token().await, "");
    }

    #[tokio::test]
    async fn test_save_and_get_token() {
        let (interface, _store, _queue) = make_interface().await;

        assert!(interface.save_token("tok-1".to_string()).await);
        assert_eq!(interface.get_token().await, "tok-1");
    }

    #[tokio::test]
    async fn test_save_token_keeps_bootstrap_ids() {
        let (interface, store, _queue) = make_interface().await;

        let mut credential = Credential::new("old");
        credential.device_root_id =
            Some(treesync_core::domain::RemoteId::new("root-1").unwrap());
        store.save_credential(&credential).await.unwrap();

        assert!(interface.save_token("new".to_string()).await);
        let loaded = store.get_credential().await.unwrap().unwrap();
        assert_eq!(loaded.value, "new");
        assert_eq!(loaded.device_root_id.unwrap().as_str(), "root-1");
    }

    #[tokio::test]
    async fn test_get_watch_list_returns_full_records() {
        let dir = tempdir();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let (interface, _store, _queue) = make_interface().await;
        interface
            .add_directories_to_watch_list(vec![dir.path().display().to_string()])
            .await;

        let list: serde_json::Value =
            serde_json::from_str(&interface.get_watch_list().await).unwrap();

        let directories = list["directories"].as_array().unwrap();
        assert_eq!(directories.len(), 1);
        assert_eq!(
            directories[0]["absolute_path"],
            dir.path().display().to_string()
        );
        assert_eq!(
            directories[0]["name"],
            dir.path().file_name().unwrap().to_str().unwrap()
        );

        let files = list["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["name"], "a.txt");
        assert_eq!(
            files[0]["absolute_path"],
            dir.path().join("a.txt").display().to_string()
        );
        assert_eq!(files[0]["file_status"], "modified");
        assert_eq!(files[0]["upload_status"], "not_uploaded");
    }

    #[tokio::test]
    async fn test_add_existing_directory_is_complete_and_enqueues() {
        let dir = tempdir();
        let (interface, _store, queue) = make_interface().await;

        let response = interface
            .add_directories_to_watch_list(vec![dir.path().display().to_string()])
            .await;
        let outcomes: serde_json::Value = serde_json::from_str(&response).unwrap();

        assert_eq!(outcomes[0]["status"], "complete");
        assert_eq!(outcomes[0]["error"], "");
        assert_eq!(queue.try_recv(), Some(Action::AddWatchlist));
        assert_eq!(queue.try_recv(), Some(Action::AddNodes));
    }

    #[tokio::test]
    async fn test_add_missing_directory_is_failed_with_error() {
        let (interface, _store, queue) = make_interface().await;

        let response = interface
            .add_directories_to_watch_list(vec!["/no/such/dir".to_string()])
            .await;
        let outcomes: serde_json::Value = serde_json::from_str(&response).unwrap();

        assert_eq!(outcomes[0]["status"], "failed");
        assert_ne!(outcomes[0]["error"], "");
        assert_eq!(outcomes[0]["path"], "/no/such/dir");
        // Nothing accepted, nothing enqueued
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn test_add_file_path_is_failed() {
        let dir = tempdir();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let (interface, _store, _queue) = make_interface().await;
        let response = interface
            .add_directories_to_watch_list(vec![file.display().to_string()])
            .await;
        let outcomes: serde_json::Value = serde_json::from_str(&response).unwrap();

        assert_eq!(outcomes[0]["status"], "failed");
        assert_eq!(outcomes[0]["error"], "not a directory");
    }

    #[tokio::test]
    async fn test_mixed_batch_reports_each_path() {
        let dir = tempdir();
        let (interface, _store, _queue) = make_interface().await;

        let response = interface
            .add_directories_to_watch_list(vec![
                dir.path().display().to_string(),
                "/no/such/dir".to_string(),
            ])
            .await;
        let outcomes: serde_json::Value = serde_json::from_str(&response).unwrap();

        assert_eq!(outcomes.as_array().unwrap().len(), 2);
        assert_eq!(outcomes[0]["status"], "complete");
        assert_eq!(outcomes[1]["status"], "failed");
    }
}
