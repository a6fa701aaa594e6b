//! Change-event state machine
//!
//! Applies one watcher event to the working set and enqueues the
//! reconciliation tags that will make the stores catch up. Handlers never
//! touch the database or the remote themselves; they only mutate the
//! working set and submit action tags, so a burst of events stays cheap.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use treesync_core::domain::{is_hidden, Node};

use crate::queue::{Action, ActionQueue};
use crate::scanner::TreeScanner;
use crate::watcher::ChangeEvent;
use crate::working_set::WorkingSet;

/// Routes watcher events into working-set mutations and action tags
#[derive(Clone)]
pub struct EventDispatcher {
    set: WorkingSet,
    scanner: TreeScanner,
    queue: Arc<ActionQueue>,
}

impl EventDispatcher {
    pub fn new(set: WorkingSet, scanner: TreeScanner, queue: Arc<ActionQueue>) -> Self {
        Self { set, scanner, queue }
    }

    /// Applies one event
    ///
    /// I/O failures on the event path mean the entry vanished between the
    /// notification and the stat; those degrade to the gone transition
    /// instead of erroring.
    pub async fn handle(&self, event: ChangeEvent) -> Result<()> {
        debug!(event = ?event, "Dispatching change event");
        match event {
            ChangeEvent::Created(path) => self.on_created(&path).await,
            ChangeEvent::Modified(path) => self.on_modified(&path).await,
            ChangeEvent::Removed(path) => self.on_gone(&path).await,
            ChangeEvent::Renamed { old, new } => {
                // A rename is a disappearance at the old path plus an
                // appearance at the new one
                self.on_gone(&old).await?;
                self.on_created(&new).await
            }
        }
    }

    async fn on_created(&self, path: &Path) -> Result<()> {
        if is_hidden(path) {
            debug!(path = %path.display(), "Ignoring hidden path");
            return Ok(());
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Created path already gone");
                return self.on_gone(path).await;
            }
        };

        if metadata.is_dir() {
            // New directory: pull its whole subtree in, then let the
            // reconciler register watches and persist it
            if let Err(e) = self.scanner.scan(path).await {
                warn!(path = %path.display(), error = %e, "Scan of new directory failed");
                return Ok(());
            }
            self.queue.submit(Action::AddWatchlist);
            self.queue.submit(Action::AddNodes);
        } else if metadata.is_file() {
            if self.set.get_node(path).await?.is_none() {
                self.set.insert_node(Node::observed(path)).await?;
            }
            self.queue.submit(Action::AddNodes);
        }
        Ok(())
    }

    async fn on_modified(&self, path: &Path) -> Result<()> {
        if is_hidden(path) {
            return Ok(());
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Modified path already gone");
                return self.on_gone(path).await;
            }
        };
        if !metadata.is_file() {
            // Directory content changes arrive as create/remove of the
            // entries themselves
            return Ok(());
        }

        // Content changed: the node goes back to needing an upload. A
        // write to a file we have never seen (e.g. created before its
        // parent was watched) counts as a first observation.
        if !self.set.mark_modified(path).await? {
            self.set.insert_node(Node::observed(path)).await?;
        }
        self.queue.submit(Action::AddNodes);
        Ok(())
    }

    async fn on_gone(&self, path: &Path) -> Result<()> {
        let (nodes, roots) = self.set.remove_subtree(path).await?;
        if nodes.is_empty() && roots.is_empty() {
            debug!(path = %path.display(), "Gone path was not tracked");
            return Ok(());
        }

        debug!(
            path = %path.display(),
            nodes = nodes.len(),
            roots = roots.len(),
            "Tracked subtree gone"
        );
        if !roots.is_empty() {
            self.queue.submit(Action::DeleteWatchlist);
        }
        if !nodes.is_empty() {
            self.queue.submit(Action::DeleteNodes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    // Default tempdir names start with a dot and would trip the hidden
    // rule; use a visible prefix
    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("treesync-test")
            .tempdir()
            .unwrap()
    }

    fn fixture() -> (EventDispatcher, WorkingSet, Arc<ActionQueue>) {
        let set = WorkingSet::spawn();
        let queue = Arc::new(ActionQueue::new(16));
        let dispatcher = EventDispatcher::new(
            set.clone(),
            TreeScanner::new(set.clone()),
            Arc::clone(&queue),
        );
        (dispatcher, set, queue)
    }

    fn drain(queue: &ActionQueue) -> Vec<Action> {
        std::iter::from_fn(|| queue.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_created_file_inserts_node_and_enqueues() {
        let dir = tempdir();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let (dispatcher, set, queue) = fixture();
        dispatcher
            .handle(ChangeEvent::Created(file.clone()))
            .await
            .unwrap();

        assert!(set.get_node(&file).await.unwrap().is_some());
        assert_eq!(drain(&queue), vec![Action::AddNodes]);
    }

    #[tokio::test]
    async fn test_created_directory_scans_subtree() {
        let dir = tempdir();
        let sub = dir.path().join("incoming");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.txt"), "a").unwrap();

        let (dispatcher, set, queue) = fixture();
        dispatcher
            .handle(ChangeEvent::Created(sub.clone()))
            .await
            .unwrap();

        assert!(set.contains_root(&sub).await.unwrap());
        assert!(set.get_node(&sub.join("a.txt")).await.unwrap().is_some());
        assert_eq!(drain(&queue), vec![Action::AddWatchlist, Action::AddNodes]);
    }

    #[tokio::test]
    async fn test_hidden_created_path_is_ignored() {
        let dir = tempdir();
        let file = dir.path().join(".env");
        fs::write(&file, "secret").unwrap();

        let (dispatcher, set, queue) = fixture();
        dispatcher.handle(ChangeEvent::Created(file.clone())).await.unwrap();

        assert!(set.get_node(&file).await.unwrap().is_none());
        assert!(drain(&queue).is_empty());
    }

    #[tokio::test]
    async fn test_modified_marks_node_dirty() {
        let dir = tempdir();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let (dispatcher, set, queue) = fixture();
        set.insert_node(Node::observed(&file)).await.unwrap();
        set.mark_uploaded(&file).await.unwrap();

        dispatcher
            .handle(ChangeEvent::Modified(file.clone()))
            .await
            .unwrap();

        let node = set.get_node(&file).await.unwrap().unwrap();
        assert!(node.needs_upload());
        assert_eq!(drain(&queue), vec![Action::AddNodes]);
    }

    #[tokio::test]
    async fn test_modified_unknown_file_is_first_observation() {
        let dir = tempdir();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let (dispatcher, set, _queue) = fixture();
        dispatcher
            .handle(ChangeEvent::Modified(file.clone()))
            .await
            .unwrap();

        assert!(set.get_node(&file).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_removed_cascades_subtree() {
        let (dispatcher, set, queue) = fixture();
        let root = PathBuf::from("/gone/tree");
        set.insert_root(treesync_core::domain::WatchRoot::observed(&root))
            .await
            .unwrap();
        set.insert_node(Node::observed(&root.join("a.txt"))).await.unwrap();

        dispatcher
            .handle(ChangeEvent::Removed(root.clone()))
            .await
            .unwrap();

        let snapshot = set.snapshot().await.unwrap();
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.roots.is_empty());
        assert_eq!(
            drain(&queue),
            vec![Action::DeleteWatchlist, Action::DeleteNodes]
        );
    }

    #[tokio::test]
    async fn test_removed_untracked_path_is_noop() {
        let (dispatcher, _set, queue) = fixture();
        dispatcher
            .handle(ChangeEvent::Removed(PathBuf::from("/never/seen")))
            .await
            .unwrap();
        assert!(drain(&queue).is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_tracking_to_new_path() {
        let dir = tempdir();
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        fs::write(&new, "content").unwrap();

        let (dispatcher, set, _queue) = fixture();
        set.insert_node(Node::observed(&old)).await.unwrap();

        dispatcher
            .handle(ChangeEvent::Renamed {
                old: old.clone(),
                new: new.clone(),
            })
            .await
            .unwrap();

        assert!(set.get_node(&old).await.unwrap().is_none());
        assert!(set.get_node(&new).await.unwrap().is_some());
    }
}
