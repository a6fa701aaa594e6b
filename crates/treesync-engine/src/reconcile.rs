//! Canonical reconciliation passes
//!
//! One routine, four parameterizations. Every pass diffs the working-set
//! snapshot against the persisted rows for one entity kind in one
//! direction and repairs the difference: additions are create-if-absent,
//! deletions are set-difference. Passes are idempotent, so a pass that
//! aborts halfway (persistence error) or races a filesystem change is
//! simply repaired by the next pass over the same tag.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use treesync_core::ports::IStateStore;

use crate::mirror::RemoteMirror;
use crate::queue::{Action, ActionQueue};
use crate::watcher::PathWatcher;
use crate::working_set::WorkingSet;

/// Which map a pass reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Nodes,
    WatchRoots,
}

/// Which side of the diff a pass repairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Add,
    Delete,
}

impl Action {
    /// The pass this tag requests
    pub fn pass(&self) -> (Entity, Direction) {
        match self {
            Action::AddNodes => (Entity::Nodes, Direction::Add),
            Action::AddWatchlist => (Entity::WatchRoots, Direction::Add),
            Action::DeleteNodes => (Entity::Nodes, Direction::Delete),
            Action::DeleteWatchlist => (Entity::WatchRoots, Direction::Delete),
        }
    }
}

/// Drains the action queue into reconciliation passes
///
/// The mirror is optional: without a credential the daemon runs in
/// local-tracking-only mode and passes skip every remote step.
pub struct Reconciler {
    set: WorkingSet,
    store: Arc<dyn IStateStore>,
    watcher: Arc<PathWatcher>,
    mirror: Option<Arc<RemoteMirror>>,
    queue: Arc<ActionQueue>,
}

impl Reconciler {
    pub fn new(
        set: WorkingSet,
        store: Arc<dyn IStateStore>,
        watcher: Arc<PathWatcher>,
        mirror: Option<Arc<RemoteMirror>>,
        queue: Arc<ActionQueue>,
    ) -> Self {
        Self {
            set,
            store,
            watcher,
            mirror,
            queue,
        }
    }

    /// Consumer loop: one drained tag launches one pass
    ///
    /// Passes run in their own tasks and may overlap each other; ordering
    /// within a tag is preserved by the queue itself.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Reconciler started");
        loop {
            let action = tokio::select! {
                action = self.queue.recv() => action,
                _ = shutdown.cancelled() => break,
            };

            let reconciler = Arc::clone(&self);
            tokio::spawn(async move {
                let (entity, direction) = action.pass();
                if let Err(e) = reconciler.reconcile(entity, direction).await {
                    error!(
                        action = action.as_str(),
                        error = %e,
                        "Reconciliation pass abandoned"
                    );
                }
            });
        }
        info!("Reconciler stopped");
    }

    /// Runs one reconciliation pass
    pub async fn reconcile(&self, entity: Entity, direction: Direction) -> Result<()> {
        debug!(?entity, ?direction, "Starting reconciliation pass");
        let snapshot = self.set.snapshot().await?;

        match (entity, direction) {
            (Entity::Nodes, Direction::Add) => {
                for node in snapshot.nodes.values() {
                    let stored = self
                        .store
                        .create_node_if_absent(node)
                        .await
                        .context("Persisting node")?;

                    if !node.needs_upload() {
                        continue;
                    }
                    let Some(mirror) = &self.mirror else { continue };

                    // Captured before the content is read; a write landing
                    // mid-upload bumps it and the confirmation is rejected
                    let revision = self.set.revision(&node.absolute_path).await?;

                    match mirror.sync_file(node).await {
                        Ok(_) => {
                            if self
                                .set
                                .mark_uploaded_if(&node.absolute_path, revision)
                                .await?
                            {
                                let mut uploaded = stored;
                                uploaded.mark_uploaded();
                                self.store
                                    .update_node(&uploaded)
                                    .await
                                    .context("Recording upload")?;
                            } else {
                                debug!(
                                    path = %node.absolute_path.display(),
                                    "Content changed during upload, staying dirty"
                                );
                            }
                        }
                        Err(e) => {
                            // Stays not-uploaded; the next add-nodes pass
                            // retries
                            warn!(
                                path = %node.absolute_path.display(),
                                error = %e,
                                "Upload failed, will retry"
                            );
                        }
                    }
                }
            }

            (Entity::Nodes, Direction::Delete) => {
                for stored in self.store.list_nodes().await.context("Listing nodes")? {
                    if snapshot.nodes.contains_key(&stored.absolute_path) {
                        continue;
                    }
                    if let Some(mirror) = &self.mirror {
                        mirror.remove(&stored.absolute_path).await;
                    }
                    self.store
                        .delete_node_by_path(&stored.absolute_path)
                        .await
                        .context("Deleting node row")?;
                    debug!(path = %stored.absolute_path.display(), "Node row deleted");
                }
            }

            (Entity::WatchRoots, Direction::Add) => {
                for root in snapshot.roots.values() {
                    self.store
                        .create_root_if_absent(root)
                        .await
                        .context("Persisting watch root")?;

                    if let Err(e) = self.watcher.watch(&root.absolute_path) {
                        warn!(
                            path = %root.absolute_path.display(),
                            error = %e,
                            "Could not register watch"
                        );
                    }

                    if let Some(mirror) = &self.mirror {
                        if let Err(e) = mirror.ensure_folder(&root.absolute_path).await {
                            warn!(
                                path = %root.absolute_path.display(),
                                error = %e,
                                "Remote folder not ensured, will retry"
                            );
                        }
                    }
                }
            }

            (Entity::WatchRoots, Direction::Delete) => {
                for stored in self.store.list_roots().await.context("Listing roots")? {
                    if snapshot.roots.contains_key(&stored.absolute_path) {
                        continue;
                    }
                    let _ = self.watcher.unwatch(&stored.absolute_path);
                    if let Some(mirror) = &self.mirror {
                        mirror.remove(&stored.absolute_path).await;
                    }
                    self.store
                        .delete_root_by_path(&stored.absolute_path)
                        .await
                        .context("Deleting root row")?;
                    debug!(path = %stored.absolute_path.display(), "Watch root row deleted");
                }

                // Watches registered for roots the set no longer has
                for watched in self.watcher.watched_paths() {
                    if !snapshot.roots.contains_key(&watched) {
                        let _ = self.watcher.unwatch(&watched);
                    }
                }
            }
        }

        debug!(?entity, ?direction, "Reconciliation pass complete");
        Ok(())
    }
}
