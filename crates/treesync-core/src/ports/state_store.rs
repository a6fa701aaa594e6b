//! Persistence port (driven/secondary port)
//!
//! Transactional CRUD for the four persisted entity kinds: tracked nodes,
//! watch roots, remote mappings, and the singleton credential.
//!
//! ## Design Notes
//!
//! - `create_*_if_absent` matches by absolute path and returns the row that
//!   ended up in the store (existing or newly created). Reconciliation
//!   passes call these repeatedly; they must be idempotent.
//! - Deletion is by path. Set-difference deletes are computed by the
//!   reconciler from `list_*` snapshots, not inside the adapter, so that a
//!   missed event self-heals on the next pass.
//! - Implementations must serialize conflicting writes through their own
//!   transaction mechanism; callers do not hold locks across calls.

use std::path::Path;

use crate::domain::{Credential, Node, RemoteMapping, WatchRoot};

/// Port trait for durable state storage
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    // --- Tracked nodes ---

    /// Insert the node unless a row with its path already exists
    ///
    /// Returns the stored row either way, with its database id filled in.
    async fn create_node_if_absent(&self, node: &Node) -> anyhow::Result<Node>;

    /// Overwrite the stored row matching the node's path
    async fn update_node(&self, node: &Node) -> anyhow::Result<()>;

    /// Fetch one node by absolute path
    async fn get_node_by_path(&self, path: &Path) -> anyhow::Result<Option<Node>>;

    /// All persisted nodes
    async fn list_nodes(&self) -> anyhow::Result<Vec<Node>>;

    /// Delete the node with the given path, if present
    async fn delete_node_by_path(&self, path: &Path) -> anyhow::Result<()>;

    // --- Watch roots ---

    /// Insert the root unless a row with its path already exists
    async fn create_root_if_absent(&self, root: &WatchRoot) -> anyhow::Result<WatchRoot>;

    /// All persisted watch roots
    async fn list_roots(&self) -> anyhow::Result<Vec<WatchRoot>>;

    /// Delete the root with the given path, if present
    async fn delete_root_by_path(&self, path: &Path) -> anyhow::Result<()>;

    // --- Remote mappings ---

    /// Insert the mapping unless one already covers its local path
    async fn create_mapping_if_absent(
        &self,
        mapping: &RemoteMapping,
    ) -> anyhow::Result<RemoteMapping>;

    /// Fetch the mapping covering a local path
    async fn get_mapping(&self, local_path: &Path) -> anyhow::Result<Option<RemoteMapping>>;

    /// All persisted mappings
    async fn list_mappings(&self) -> anyhow::Result<Vec<RemoteMapping>>;

    /// Drop the mapping covering a local path, if present
    async fn delete_mapping(&self, local_path: &Path) -> anyhow::Result<()>;

    // --- Credential (singleton) ---

    /// Fetch the credential, if one was ever saved
    async fn get_credential(&self) -> anyhow::Result<Option<Credential>>;

    /// Create or replace the singleton credential row
    async fn save_credential(&self, credential: &Credential) -> anyhow::Result<()>;
}
