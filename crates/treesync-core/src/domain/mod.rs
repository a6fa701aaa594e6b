//! Domain entities and rules for TreeSync
//!
//! Pure business types with no I/O. Everything here is shared between the
//! reconciliation engine, the persistence adapter, and the IPC surface.

pub mod credential;
pub mod errors;
pub mod newtypes;
pub mod node;
pub mod path;
pub mod remote_mapping;
pub mod watch_root;

pub use credential::Credential;
pub use errors::DomainError;
pub use newtypes::RemoteId;
pub use node::{FileStatus, Node, UploadStatus};
pub use path::{is_hidden, is_self_or_descendant};
pub use remote_mapping::RemoteMapping;
pub use watch_root::WatchRoot;
