//! Filesystem watching
//!
//! Wraps the `notify` crate behind a [`PathWatcher`] that registers watch
//! interest per directory (non-recursive; nested directories get their own
//! registration as the scanner discovers them) and converts raw OS events
//! into [`ChangeEvent`] values delivered over an mpsc channel.
//!
//! The watcher also tracks its own registered set so that reconciliation
//! passes can diff it against the working set's roots.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A filesystem change observed under a watched directory
///
/// The engine's internal event vocabulary, decoupled from the raw `notify`
/// event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file or directory appeared at the path
    Created(PathBuf),
    /// A file's content changed
    Modified(PathBuf),
    /// The path no longer exists
    Removed(PathBuf),
    /// The entry moved within watched territory
    Renamed {
        /// Path before the move
        old: PathBuf,
        /// Path after the move
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// The path this event is about; for renames, the destination
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Removed(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

struct WatcherState {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    closed: bool,
}

/// Registers per-directory watch interest and emits [`ChangeEvent`]s
///
/// Directories are watched non-recursively: each directory the scanner
/// discovers becomes its own registration, mirroring the watch-root rows.
/// All methods take `&self`; the inner state is serialized by a mutex so
/// the watcher can be shared between the event loop and the reconciler.
pub struct PathWatcher {
    state: Mutex<WatcherState>,
}

impl PathWatcher {
    /// Creates the watcher and the channel its events arrive on
    ///
    /// `capacity` bounds the event channel; if the consumer falls behind,
    /// further events are dropped with a warning rather than blocking the
    /// notify callback thread.
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(capacity);

        info!(capacity, "Initializing path watcher");

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if let Err(e) = event_tx.try_send(change) {
                            warn!(error = %e, "Dropping change event (channel full or closed)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "Watcher backend error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        Ok((
            Self {
                state: Mutex::new(WatcherState {
                    watcher,
                    watched: HashSet::new(),
                    closed: false,
                }),
            },
            event_rx,
        ))
    }

    /// Registers watch interest for one directory (idempotent)
    pub fn watch(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            anyhow::bail!("Watcher is closed");
        }
        if state.watched.contains(path) {
            return Ok(());
        }

        state
            .watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        state.watched.insert(path.to_path_buf());
        info!(path = %path.display(), "Watching directory");
        Ok(())
    }

    /// Drops watch interest for one directory
    ///
    /// Unknown paths are a no-op: the directory may already be gone, in
    /// which case the OS dropped the watch on its own.
    pub fn unwatch(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if !state.watched.remove(path) {
            return Ok(());
        }

        if let Err(e) = state.watcher.unwatch(path) {
            // The kernel removes inotify watches when the inode vanishes
            debug!(path = %path.display(), error = %e, "Unwatch failed (path likely gone)");
        }
        info!(path = %path.display(), "Stopped watching directory");
        Ok(())
    }

    /// True if the directory is currently registered
    pub fn is_watched(&self, path: &Path) -> bool {
        self.lock().watched.contains(path)
    }

    /// The currently registered directories
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.lock().watched.iter().cloned().collect()
    }

    /// Drops every registration and refuses further `watch` calls
    ///
    /// Called once during shutdown; repeated calls are a no-op.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        let paths: Vec<PathBuf> = state.watched.drain().collect();
        for path in paths {
            if let Err(e) = state.watcher.unwatch(&path) {
                debug!(path = %path.display(), error = %e, "Unwatch during close failed");
            }
        }
        info!("Path watcher closed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatcherState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Converts a raw `notify` event into the engine vocabulary
///
/// - `Create(*)` becomes [`ChangeEvent::Created`]
/// - `Modify(Data(*))` becomes [`ChangeEvent::Modified`]
/// - `Modify(Name(Both))` with two paths becomes [`ChangeEvent::Renamed`];
///   `Name(From)` alone means the entry left watched territory (`Removed`),
///   `Name(To)` alone means it arrived (`Created`)
/// - `Remove(*)` becomes [`ChangeEvent::Removed`]
/// - Metadata-only and access events carry no content change and are dropped
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let first = event.paths.first();

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(first?.clone())),

        EventKind::Modify(ModifyKind::Data(_)) => Some(ChangeEvent::Modified(first?.clone())),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            Some(ChangeEvent::Renamed {
                old: event.paths[0].clone(),
                new: event.paths[1].clone(),
            })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(ChangeEvent::Removed(first?.clone()))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(ChangeEvent::Created(first?.clone()))
        }
        // Rename with unknown direction: resolve by probing the path
        EventKind::Modify(ModifyKind::Name(_)) => {
            let path = first?.clone();
            if path.exists() {
                Some(ChangeEvent::Created(path))
            } else {
                Some(ChangeEvent::Removed(path))
            }
        }

        EventKind::Remove(_) => Some(ChangeEvent::Removed(first?.clone())),

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: EventKind, paths: Vec<&str>) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_create_maps_to_created() {
        let event = raw(
            EventKind::Create(notify::event::CreateKind::File),
            vec!["/data/a.txt"],
        );
        assert_eq!(
            map_notify_event(&event),
            Some(ChangeEvent::Created(PathBuf::from("/data/a.txt")))
        );
    }

    #[test]
    fn test_data_modify_maps_to_modified() {
        let event = raw(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            vec!["/data/a.txt"],
        );
        assert_eq!(
            map_notify_event(&event),
            Some(ChangeEvent::Modified(PathBuf::from("/data/a.txt")))
        );
    }

    #[test]
    fn test_remove_maps_to_removed() {
        let event = raw(
            EventKind::Remove(notify::event::RemoveKind::Any),
            vec!["/data/a.txt"],
        );
        assert_eq!(
            map_notify_event(&event),
            Some(ChangeEvent::Removed(PathBuf::from("/data/a.txt")))
        );
    }

    #[test]
    fn test_two_path_rename_maps_to_renamed() {
        let event = raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec!["/data/old.txt", "/data/new.txt"],
        );
        assert_eq!(
            map_notify_event(&event),
            Some(ChangeEvent::Renamed {
                old: PathBuf::from("/data/old.txt"),
                new: PathBuf::from("/data/new.txt"),
            })
        );
    }

    #[test]
    fn test_rename_from_maps_to_removed() {
        let event = raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            vec!["/data/old.txt"],
        );
        assert_eq!(
            map_notify_event(&event),
            Some(ChangeEvent::Removed(PathBuf::from("/data/old.txt")))
        );
    }

    #[test]
    fn test_metadata_modify_is_ignored() {
        let event = raw(
            EventKind::Modify(ModifyKind::Metadata(
                notify::event::MetadataKind::Permissions,
            )),
            vec!["/data/a.txt"],
        );
        assert_eq!(map_notify_event(&event), None);
    }

    #[test]
    fn test_access_is_ignored() {
        let event = raw(
            EventKind::Access(notify::event::AccessKind::Read),
            vec!["/data/a.txt"],
        );
        assert_eq!(map_notify_event(&event), None);
    }

    #[test]
    fn test_event_without_paths_is_ignored() {
        let event = raw(EventKind::Create(notify::event::CreateKind::File), vec![]);
        assert_eq!(map_notify_event(&event), None);
    }

    #[test]
    fn test_rename_path_accessor_returns_destination() {
        let event = ChangeEvent::Renamed {
            old: PathBuf::from("/data/old.txt"),
            new: PathBuf::from("/data/new.txt"),
        };
        assert_eq!(event.path(), Path::new("/data/new.txt"));
    }

    #[tokio::test]
    async fn test_watch_is_idempotent_and_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = PathWatcher::new(16).unwrap();

        watcher.watch(dir.path()).unwrap();
        watcher.watch(dir.path()).unwrap();

        assert!(watcher.is_watched(dir.path()));
        assert_eq!(watcher.watched_paths().len(), 1);

        watcher.unwatch(dir.path()).unwrap();
        assert!(!watcher.is_watched(dir.path()));
        // Unwatching again is a no-op
        watcher.unwatch(dir.path()).unwrap();
    }

    #[tokio::test]
    async fn test_close_refuses_new_watches() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = PathWatcher::new(16).unwrap();
        watcher.watch(dir.path()).unwrap();

        watcher.close();
        watcher.close();

        assert!(watcher.watched_paths().is_empty());
        assert!(watcher.watch(dir.path()).is_err());
    }
}
