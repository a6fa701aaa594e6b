//! Persisted authorization material

use serde::{Deserialize, Serialize};

use super::RemoteId;

/// The daemon's singleton credential row
///
/// Holds the opaque serialized token handed over via `SaveToken`, plus the
/// two bootstrap folder ids resolved on first contact with the remote
/// service: the device-root folder shared by all hosts and the per-host
/// folder every mirrored path nests under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque serialized token (the daemon never inspects it)
    pub value: String,
    /// Device-root remote folder, resolved at bootstrap
    pub device_root_id: Option<RemoteId>,
    /// Per-host remote folder, resolved at bootstrap
    pub host_folder_id: Option<RemoteId>,
}

impl Credential {
    /// Create a credential that has not completed remote bootstrap yet
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            device_root_id: None,
            host_folder_id: None,
        }
    }

    /// True once both bootstrap folders have been resolved
    pub fn is_bootstrapped(&self) -> bool {
        self.device_root_id.is_some() && self.host_folder_id.is_some()
    }
}
