//! TreeSync IPC - D-Bus control surface
//!
//! Exposes the daemon's request/response surface on the session bus so
//! same-host clients can manage the credential and the watch list:
//!
//! - `io.treesync.TreeSync1` - token storage, watch-list queries, and
//!   watch-list additions
//!
//! Structured responses are JSON strings, matching what the CLI expects.

pub mod service;

pub use service::{DbusService, TreeSyncInterface, DBUS_NAME, DBUS_PATH};
