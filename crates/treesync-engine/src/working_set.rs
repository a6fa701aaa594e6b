//! In-memory working set of tracked files and watch roots
//!
//! The working set is the engine's answer to "what exists on disk right
//! now". It holds two maps keyed by absolute path, and all access goes
//! through a single owning task: callers hold a cheap [`WorkingSet`] handle
//! and exchange messages with the task over an mpsc channel, so there are
//! no locks and no lock ordering to get wrong. Concurrent writers to the
//! same path are serialized by the channel; the last write wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use treesync_core::domain::{is_self_or_descendant, Node, WatchRoot};

/// Consistent copy of both maps, taken in one actor turn
#[derive(Debug, Clone, Default)]
pub struct WorkingSetSnapshot {
    /// Tracked files keyed by absolute path
    pub nodes: HashMap<PathBuf, Node>,
    /// Watched directories keyed by absolute path
    pub roots: HashMap<PathBuf, WatchRoot>,
}

enum Command {
    InsertNode(Node, oneshot::Sender<()>),
    InsertRoot(WatchRoot, oneshot::Sender<()>),
    GetNode(PathBuf, oneshot::Sender<Option<Node>>),
    ContainsRoot(PathBuf, oneshot::Sender<bool>),
    MarkModified(PathBuf, oneshot::Sender<bool>),
    MarkUploaded(PathBuf, oneshot::Sender<bool>),
    Revision(PathBuf, oneshot::Sender<u64>),
    MarkUploadedIf(PathBuf, u64, oneshot::Sender<bool>),
    RemoveSubtree(PathBuf, oneshot::Sender<(Vec<Node>, Vec<WatchRoot>)>),
    Snapshot(oneshot::Sender<WorkingSetSnapshot>),
}

/// Handle to the working-set actor
///
/// Cloning is cheap; all clones talk to the same owning task. The task
/// exits when the last handle is dropped.
#[derive(Clone)]
pub struct WorkingSet {
    tx: mpsc::Sender<Command>,
}

impl WorkingSet {
    /// Spawns the owning task and returns a handle to it
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_actor(rx));
        Self { tx }
    }

    /// Inserts or replaces the node at its path
    pub async fn insert_node(&self, node: Node) -> Result<()> {
        self.send(|reply| Command::InsertNode(node, reply)).await
    }

    /// Inserts or replaces the root at its path
    pub async fn insert_root(&self, root: WatchRoot) -> Result<()> {
        self.send(|reply| Command::InsertRoot(root, reply)).await
    }

    /// Looks up the node at an exact path
    pub async fn get_node(&self, path: &Path) -> Result<Option<Node>> {
        self.send(|reply| Command::GetNode(path.to_path_buf(), reply))
            .await
    }

    /// True if a root is registered at the exact path
    pub async fn contains_root(&self, path: &Path) -> Result<bool> {
        self.send(|reply| Command::ContainsRoot(path.to_path_buf(), reply))
            .await
    }

    /// Puts the node at the path back into `{modified, not_uploaded}`
    ///
    /// Returns false if no node exists at the path.
    pub async fn mark_modified(&self, path: &Path) -> Result<bool> {
        self.send(|reply| Command::MarkModified(path.to_path_buf(), reply))
            .await
    }

    /// Records a successful upload for the node at the path
    ///
    /// Returns false if no node exists at the path.
    pub async fn mark_uploaded(&self, path: &Path) -> Result<bool> {
        self.send(|reply| Command::MarkUploaded(path.to_path_buf(), reply))
            .await
    }

    /// The write revision of the node at the path
    ///
    /// Bumped on every insert and every modified transition, so an uploader
    /// can detect content that changed underneath it. Unknown paths are
    /// revision 0.
    pub async fn revision(&self, path: &Path) -> Result<u64> {
        self.send(|reply| Command::Revision(path.to_path_buf(), reply))
            .await
    }

    /// Records an upload only if the node was not written since `revision`
    ///
    /// Returns false, leaving the node dirty, when the revision moved on or
    /// the node no longer exists; the caller's next pass re-uploads the
    /// newer content.
    pub async fn mark_uploaded_if(&self, path: &Path, revision: u64) -> Result<bool> {
        self.send(|reply| Command::MarkUploadedIf(path.to_path_buf(), revision, reply))
            .await
    }

    /// Removes the path and everything below it, from both maps
    ///
    /// The boundary is separator-bounded: removing `/a/b` takes `/a/b` and
    /// `/a/b/...` but leaves the sibling `/a/bc` alone. Returns the removed
    /// entries so the caller can schedule their cleanup.
    pub async fn remove_subtree(&self, path: &Path) -> Result<(Vec<Node>, Vec<WatchRoot>)> {
        self.send(|reply| Command::RemoveSubtree(path.to_path_buf(), reply))
            .await
    }

    /// Takes a consistent snapshot of both maps
    pub async fn snapshot(&self) -> Result<WorkingSetSnapshot> {
        self.send(Command::Snapshot).await
    }

    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .ok()
            .context("Working set task is gone")?;
        reply_rx.await.context("Working set task dropped the reply")
    }
}

async fn run_actor(mut rx: mpsc::Receiver<Command>) {
    let mut nodes: HashMap<PathBuf, Node> = HashMap::new();
    let mut roots: HashMap<PathBuf, WatchRoot> = HashMap::new();
    // Per-path write revisions; a dirty node re-dirtied by another write
    // looks identical, so the counter is what uploaders check against
    let mut revisions: HashMap<PathBuf, u64> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::InsertNode(node, reply) => {
                debug!(path = %node.absolute_path.display(), "Working set: insert node");
                *revisions.entry(node.absolute_path.clone()).or_insert(0) += 1;
                nodes.insert(node.absolute_path.clone(), node);
                let _ = reply.send(());
            }
            Command::InsertRoot(root, reply) => {
                debug!(path = %root.absolute_path.display(), "Working set: insert root");
                roots.insert(root.absolute_path.clone(), root);
                let _ = reply.send(());
            }
            Command::GetNode(path, reply) => {
                let _ = reply.send(nodes.get(&path).cloned());
            }
            Command::ContainsRoot(path, reply) => {
                let _ = reply.send(roots.contains_key(&path));
            }
            Command::MarkModified(path, reply) => {
                let found = match nodes.get_mut(&path) {
                    Some(node) => {
                        node.mark_modified();
                        *revisions.entry(path).or_insert(0) += 1;
                        true
                    }
                    None => false,
                };
                let _ = reply.send(found);
            }
            Command::MarkUploaded(path, reply) => {
                let found = match nodes.get_mut(&path) {
                    Some(node) => {
                        node.mark_uploaded();
                        true
                    }
                    None => false,
                };
                let _ = reply.send(found);
            }
            Command::Revision(path, reply) => {
                let _ = reply.send(revisions.get(&path).copied().unwrap_or(0));
            }
            Command::MarkUploadedIf(path, expected, reply) => {
                let current = revisions.get(&path).copied().unwrap_or(0);
                let confirmed = match nodes.get_mut(&path) {
                    Some(node) if current == expected => {
                        node.mark_uploaded();
                        true
                    }
                    _ => false,
                };
                if !confirmed {
                    debug!(
                        path = %path.display(),
                        expected,
                        current,
                        "Working set: upload confirmation rejected"
                    );
                }
                let _ = reply.send(confirmed);
            }
            Command::RemoveSubtree(path, reply) => {
                let node_paths: Vec<PathBuf> = nodes
                    .keys()
                    .filter(|p| is_self_or_descendant(p, &path))
                    .cloned()
                    .collect();
                let root_paths: Vec<PathBuf> = roots
                    .keys()
                    .filter(|p| is_self_or_descendant(p, &path))
                    .cloned()
                    .collect();

                let mut removed_nodes = Vec::with_capacity(node_paths.len());
                for p in node_paths {
                    revisions.remove(&p);
                    if let Some(node) = nodes.remove(&p) {
                        removed_nodes.push(node);
                    }
                }
                let mut removed_roots = Vec::with_capacity(root_paths.len());
                for p in root_paths {
                    if let Some(root) = roots.remove(&p) {
                        removed_roots.push(root);
                    }
                }

                debug!(
                    path = %path.display(),
                    nodes = removed_nodes.len(),
                    roots = removed_roots.len(),
                    "Working set: removed subtree"
                );
                let _ = reply.send((removed_nodes, removed_roots));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(WorkingSetSnapshot {
                    nodes: nodes.clone(),
                    roots: roots.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get_node() {
        let set = WorkingSet::spawn();
        set.insert_node(Node::observed(Path::new("/data/a.txt")))
            .await
            .unwrap();

        let node = set.get_node(Path::new("/data/a.txt")).await.unwrap();
        assert_eq!(node.unwrap().name, "a.txt");
        assert!(set.get_node(Path::new("/data/b.txt")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let set = WorkingSet::spawn();
        let mut uploaded = Node::observed(Path::new("/data/a.txt"));
        uploaded.mark_uploaded();

        set.insert_node(Node::observed(Path::new("/data/a.txt")))
            .await
            .unwrap();
        set.insert_node(uploaded).await.unwrap();

        let node = set.get_node(Path::new("/data/a.txt")).await.unwrap().unwrap();
        assert!(!node.needs_upload());
    }

    #[tokio::test]
    async fn test_mark_transitions() {
        let set = WorkingSet::spawn();
        set.insert_node(Node::observed(Path::new("/data/a.txt")))
            .await
            .unwrap();

        assert!(set.mark_uploaded(Path::new("/data/a.txt")).await.unwrap());
        let node = set.get_node(Path::new("/data/a.txt")).await.unwrap().unwrap();
        assert!(!node.needs_upload());

        assert!(set.mark_modified(Path::new("/data/a.txt")).await.unwrap());
        let node = set.get_node(Path::new("/data/a.txt")).await.unwrap().unwrap();
        assert!(node.needs_upload());

        // Unknown paths report absence instead of failing
        assert!(!set.mark_modified(Path::new("/nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_during_upload_keeps_node_dirty() {
        let set = WorkingSet::spawn();
        let path = Path::new("/data/a.txt");
        set.insert_node(Node::observed(path)).await.unwrap();

        // Uploader captures the revision, then a write lands while the
        // content is in flight
        let revision = set.revision(path).await.unwrap();
        assert!(set.mark_modified(path).await.unwrap());

        assert!(!set.mark_uploaded_if(path, revision).await.unwrap());
        let node = set.get_node(path).await.unwrap().unwrap();
        assert!(node.needs_upload());

        // With no further writes the confirmation lands
        let revision = set.revision(path).await.unwrap();
        assert!(set.mark_uploaded_if(path, revision).await.unwrap());
        let node = set.get_node(path).await.unwrap().unwrap();
        assert!(!node.needs_upload());
    }

    #[tokio::test]
    async fn test_remove_subtree_is_separator_bounded() {
        let set = WorkingSet::spawn();
        set.insert_root(WatchRoot::observed(Path::new("/a/b"))).await.unwrap();
        set.insert_root(WatchRoot::observed(Path::new("/a/bc"))).await.unwrap();
        set.insert_node(Node::observed(Path::new("/a/b/x.txt"))).await.unwrap();
        set.insert_node(Node::observed(Path::new("/a/bc/y.txt"))).await.unwrap();

        let (nodes, roots) = set.remove_subtree(Path::new("/a/b")).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].absolute_path, PathBuf::from("/a/b/x.txt"));
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].absolute_path, PathBuf::from("/a/b"));

        // The string-prefix sibling survives
        let snapshot = set.snapshot().await.unwrap();
        assert!(snapshot.roots.contains_key(Path::new("/a/bc")));
        assert!(snapshot.nodes.contains_key(Path::new("/a/bc/y.txt")));
    }

    #[tokio::test]
    async fn test_remove_subtree_of_exact_file() {
        let set = WorkingSet::spawn();
        set.insert_node(Node::observed(Path::new("/a/b.txt"))).await.unwrap();

        let (nodes, roots) = set.remove_subtree(Path::new("/a/b.txt")).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(roots.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_sees_both_maps() {
        let set = WorkingSet::spawn();
        set.insert_root(WatchRoot::observed(Path::new("/data"))).await.unwrap();
        set.insert_node(Node::observed(Path::new("/data/a.txt"))).await.unwrap();

        let snapshot = set.snapshot().await.unwrap();
        assert_eq!(snapshot.roots.len(), 1);
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(set.contains_root(Path::new("/data")).await.unwrap());
    }
}
