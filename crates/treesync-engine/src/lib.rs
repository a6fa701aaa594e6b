//! TreeSync Engine - reconciliation core
//!
//! Turns raw filesystem events into a converging remote mirror of the
//! watched trees. The moving parts, in data-flow order:
//!
//! ```text
//! inotify ──→ PathWatcher ──→ EventDispatcher ──→ WorkingSet (actor)
//!                                   │                  │
//!                                   ▼                  ▼
//!                              ActionQueue ──→ Reconciler ──→ IStateStore
//!                                                   │
//!                                                   ▼
//!                                             RemoteMirror ──→ IObjectStore
//! ```
//!
//! The [`WorkingSet`] is the in-memory source of truth for what exists on
//! disk right now. Reconciliation passes diff it against the persisted rows
//! and the remote mirror; every pass is idempotent, so a missed event
//! self-heals on the next pass.

pub mod bootstrap;
pub mod dispatcher;
pub mod mirror;
pub mod queue;
pub mod reconcile;
pub mod scanner;
pub mod watcher;
pub mod working_set;

pub use dispatcher::EventDispatcher;
pub use mirror::RemoteMirror;
pub use queue::{Action, ActionQueue};
pub use reconcile::Reconciler;
pub use scanner::TreeScanner;
pub use watcher::{ChangeEvent, PathWatcher};
pub use working_set::{WorkingSet, WorkingSetSnapshot};
