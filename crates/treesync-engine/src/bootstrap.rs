//! Daemon startup sequence
//!
//! Two stages run before the event loop starts:
//!
//! 1. [`connect_remote`] — if a credential is saved, resolve (or create)
//!    the device-root folder and this host's folder inside it, persisting
//!    their ids on the credential row. No credential means
//!    local-tracking-only mode and no remote calls at all.
//! 2. [`startup_pass`] — seed the working set from the persisted rows,
//!    purge rows whose paths vanished while the daemon was down, rescan
//!    every surviving root, and enqueue all four action tags so the first
//!    reconciliation brings everything current.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use treesync_core::domain::RemoteId;
use treesync_core::ports::{IObjectStore, IStateStore};

use crate::mirror::RemoteMirror;
use crate::queue::{Action, ActionQueue};
use crate::scanner::TreeScanner;
use crate::working_set::WorkingSet;

/// Well-known alias the object store accepts as the account root
const ROOT_ALIAS: &str = "root";

/// Resolves the device-root and host folders, returning the mirror
///
/// Returns `None` when no credential is saved. Folder ids already recorded
/// on the credential row are trusted; missing ones are resolved with the
/// same lookup-before-create pattern the mirror uses everywhere.
pub async fn connect_remote(
    store: Arc<dyn IStateStore>,
    objects: Arc<dyn IObjectStore>,
    device_root_name: &str,
) -> Result<Option<RemoteMirror>> {
    let Some(mut credential) = store.get_credential().await? else {
        info!("No credential saved, running in local-tracking-only mode");
        return Ok(None);
    };

    let account_root = RemoteId::new(ROOT_ALIAS).context("Root alias")?;

    let device_root = match &credential.device_root_id {
        Some(id) => id.clone(),
        None => {
            let id = resolve_or_create(&*objects, device_root_name, &account_root).await?;
            credential.device_root_id = Some(id.clone());
            id
        }
    };

    let host_folder = match &credential.host_folder_id {
        Some(id) => id.clone(),
        None => {
            let name = hostname();
            let id = resolve_or_create(&*objects, &name, &device_root).await?;
            credential.host_folder_id = Some(id.clone());
            id
        }
    };

    store
        .save_credential(&credential)
        .await
        .context("Persisting bootstrap folder ids")?;

    info!(host_folder = %host_folder, "Remote mirror connected");
    Ok(Some(RemoteMirror::new(store, objects, host_folder)))
}

/// One full convergence pass over everything persisted
pub async fn startup_pass(
    set: &WorkingSet,
    store: &Arc<dyn IStateStore>,
    mirror: Option<&Arc<RemoteMirror>>,
    scanner: &TreeScanner,
    queue: &ActionQueue,
) -> Result<()> {
    // Seed nodes, purging rows whose file vanished while we were down
    for node in store.list_nodes().await.context("Listing nodes")? {
        if path_exists(&node.absolute_path).await {
            set.insert_node(node).await?;
        } else {
            info!(path = %node.absolute_path.display(), "Purging vanished file");
            if let Some(mirror) = mirror {
                mirror.remove(&node.absolute_path).await;
            }
            store.delete_node_by_path(&node.absolute_path).await?;
        }
    }

    // Same for roots; surviving ones get a rescan to pick up offline changes
    let mut surviving = Vec::new();
    for root in store.list_roots().await.context("Listing roots")? {
        if path_exists(&root.absolute_path).await {
            set.insert_root(root.clone()).await?;
            surviving.push(root.absolute_path);
        } else {
            info!(path = %root.absolute_path.display(), "Purging vanished root");
            if let Some(mirror) = mirror {
                mirror.remove(&root.absolute_path).await;
            }
            store.delete_root_by_path(&root.absolute_path).await?;
        }
    }

    for path in surviving {
        if let Err(e) = scanner.scan(&path).await {
            warn!(path = %path.display(), error = %e, "Startup rescan failed");
        }
    }

    queue.submit(Action::AddWatchlist);
    queue.submit(Action::AddNodes);
    queue.submit(Action::DeleteWatchlist);
    queue.submit(Action::DeleteNodes);

    info!("Startup pass complete");
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

async fn resolve_or_create(
    objects: &dyn IObjectStore,
    name: &str,
    parent: &RemoteId,
) -> Result<RemoteId> {
    let existing = objects
        .list(Some(name), parent, true)
        .await
        .with_context(|| format!("Lookup of folder {name}"))?;
    if let Some(folder) = existing.into_iter().find(|o| o.is_folder) {
        return Ok(folder.id);
    }

    let created = objects
        .create_folder(name, Some(parent), name)
        .await
        .with_context(|| format!("Creation of folder {name}"))?;
    info!(name, id = %created.id, "Bootstrap folder created");
    Ok(created.id)
}

/// This machine's name for the per-host remote folder
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}
