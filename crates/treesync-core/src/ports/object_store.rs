//! Remote object-store port (driven/secondary port)
//!
//! Interface to the remote service the mirror replicates into. The shape
//! follows an object-store API: filtered listing under a parent, metadata
//! creates (optionally with content), and deletes by id.
//!
//! ## Design Notes
//!
//! - Lookup-before-create lives in the mirror, not here; the port only
//!   exposes the primitive calls.
//! - Implementations are expected to be cheap to share (`Arc`) and safe to
//!   call concurrently; the mirror serializes its own writes.

use crate::domain::RemoteId;

/// Metadata of one remote object (folder or file)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Identifier assigned by the remote service
    pub id: RemoteId,
    /// Object name (file or folder name)
    pub name: String,
    /// True for folders
    pub is_folder: bool,
}

/// Port trait for remote object-store operations
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// List objects under `parent`, optionally filtered by exact name
    ///
    /// When `exclude_trashed` is set, soft-deleted objects are omitted;
    /// every mirror lookup sets it so trashed remnants are never reused.
    async fn list(
        &self,
        name: Option<&str>,
        parent: &RemoteId,
        exclude_trashed: bool,
    ) -> anyhow::Result<Vec<RemoteObject>>;

    /// Create a folder under `parent` (`None` for a top-level folder)
    ///
    /// `local_path` is recorded as the folder's description so the remote
    /// hierarchy stays traceable to its local origin.
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&RemoteId>,
        local_path: &str,
    ) -> anyhow::Result<RemoteObject>;

    /// Upload a whole file under `parent`
    async fn upload_file(
        &self,
        name: &str,
        parent: &RemoteId,
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteObject>;

    /// Delete an object by id
    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()>;
}
