//! Remote hierarchy mirroring
//!
//! Replays the local tree into the object store, one absolute-path segment
//! per remote folder, rooted at this host's folder. The store's
//! `RemoteMapping` rows cache path-to-object resolutions; when a mapping is
//! missing the mirror looks the name up under its parent before creating,
//! so repeated passes and crash recovery never duplicate remote objects.
//!
//! All mirror writes run under a single async lock. Reconciliation passes
//! may overlap, but only one of them talks to the remote at a time, which
//! keeps lookup-before-create atomic without per-path locking.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use treesync_core::domain::{Node, RemoteId, RemoteMapping};
use treesync_core::ports::{IObjectStore, IStateStore, RemoteObject};

/// Mirrors local paths into the remote object store
pub struct RemoteMirror {
    store: Arc<dyn IStateStore>,
    objects: Arc<dyn IObjectStore>,
    host_folder: RemoteId,
    write_lock: Mutex<()>,
}

impl RemoteMirror {
    /// Creates a mirror rooted at the given per-host remote folder
    pub fn new(
        store: Arc<dyn IStateStore>,
        objects: Arc<dyn IObjectStore>,
        host_folder: RemoteId,
    ) -> Self {
        Self {
            store,
            objects,
            host_folder,
            write_lock: Mutex::new(()),
        }
    }

    /// The remote folder all mirrored paths live under
    pub fn host_folder(&self) -> &RemoteId {
        &self.host_folder
    }

    /// Ensures the remote folder chain for a local directory exists
    ///
    /// Returns the remote id of the folder corresponding to `path`.
    pub async fn ensure_folder(&self, path: &Path) -> Result<RemoteId> {
        let _guard = self.write_lock.lock().await;
        self.ensure_folder_chain(path).await
    }

    /// Uploads one file, creating its remote parent chain as needed
    ///
    /// An existing mapping means a previous version is already mirrored; it
    /// is deleted remotely before the fresh content goes up, so the parent
    /// never holds two objects with the file's name.
    pub async fn sync_file(&self, node: &Node) -> Result<RemoteId> {
        let _guard = self.write_lock.lock().await;

        let path = node.absolute_path.as_path();
        let parent_path = path
            .parent()
            .with_context(|| format!("File {} has no parent directory", path.display()))?;
        let parent_id = self.ensure_folder_chain(parent_path).await?;

        if let Some(mapping) = self.store.get_mapping(path).await? {
            debug!(path = %path.display(), "Replacing previously mirrored content");
            if let Err(e) = self.objects.delete(&mapping.remote_object_id).await {
                warn!(
                    path = %path.display(),
                    id = %mapping.remote_object_id,
                    error = %e,
                    "Failed to delete stale remote object, continuing"
                );
            }
            self.store.delete_mapping(path).await?;
        }

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let object = self
            .objects
            .upload_file(&node.name, &parent_id, data)
            .await
            .with_context(|| format!("Upload failed for {}", path.display()))?;

        self.persist_mapping(path, &object.id, &parent_id).await?;
        info!(path = %path.display(), id = %object.id, "File mirrored");
        Ok(object.id)
    }

    /// Best-effort removal of the remote object mapped to a local path
    ///
    /// Remote failures are logged and the mapping is dropped anyway; local
    /// state never waits on the remote. Paths without a mapping are a
    /// no-op.
    pub async fn remove(&self, path: &Path) {
        let _guard = self.write_lock.lock().await;

        let mapping = match self.store.get_mapping(path).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Mapping lookup failed during removal");
                return;
            }
        };

        if let Err(e) = self.objects.delete(&mapping.remote_object_id).await {
            warn!(
                path = %path.display(),
                id = %mapping.remote_object_id,
                error = %e,
                "Remote delete failed, dropping mapping anyway"
            );
        } else {
            info!(path = %path.display(), id = %mapping.remote_object_id, "Remote object deleted");
        }

        if let Err(e) = self.store.delete_mapping(path).await {
            warn!(path = %path.display(), error = %e, "Failed to drop mapping row");
        }
    }

    /// Walks the path segments, resolving or creating one folder per prefix
    async fn ensure_folder_chain(&self, path: &Path) -> Result<RemoteId> {
        let mut parent = self.host_folder.clone();
        let mut prefix = PathBuf::new();

        for component in path.components() {
            let segment = match component {
                Component::Normal(seg) => seg.to_string_lossy().into_owned(),
                Component::RootDir => {
                    prefix.push(component.as_os_str());
                    continue;
                }
                _ => continue,
            };
            prefix.push(&segment);

            if let Some(mapping) = self.store.get_mapping(&prefix).await? {
                parent = mapping.remote_object_id;
                continue;
            }

            let folder = self
                .resolve_or_create_folder(&segment, &parent, &prefix)
                .await?;
            self.persist_mapping(&prefix, &folder.id, &parent).await?;
            parent = folder.id;
        }

        Ok(parent)
    }

    /// Lookup-before-create for one folder name under a parent
    async fn resolve_or_create_folder(
        &self,
        name: &str,
        parent: &RemoteId,
        local_path: &Path,
    ) -> Result<RemoteObject> {
        let existing = self
            .objects
            .list(Some(name), parent, true)
            .await
            .with_context(|| format!("Folder lookup failed for {name}"))?;
        if let Some(folder) = existing.into_iter().find(|o| o.is_folder) {
            debug!(name, id = %folder.id, "Reusing existing remote folder");
            return Ok(folder);
        }

        let created = self
            .objects
            .create_folder(name, Some(parent), &local_path.to_string_lossy())
            .await
            .with_context(|| format!("Folder creation failed for {name}"))?;
        info!(name, id = %created.id, "Remote folder created");
        Ok(created)
    }

    async fn persist_mapping(
        &self,
        local_path: &Path,
        object_id: &RemoteId,
        parent_id: &RemoteId,
    ) -> Result<()> {
        let mapping = RemoteMapping {
            id: 0,
            name: local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            local_path: local_path.to_path_buf(),
            remote_object_id: object_id.clone(),
            remote_parent_id: parent_id.clone(),
        };
        self.store
            .create_mapping_if_absent(&mapping)
            .await
            .with_context(|| format!("Failed to persist mapping for {}", local_path.display()))?;
        Ok(())
    }
}
