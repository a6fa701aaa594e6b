//! Local path to remote object mapping

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::RemoteId;

/// Cached association between one local absolute path and a remote object
///
/// At most one mapping exists per local path. Mappings let repeated
/// reconciliation passes reuse remote objects instead of re-creating them.
/// They are a cache, not a source of truth: when a mapping disagrees with
/// either the remote service or the local state, the mirror re-resolves
/// with a lookup-before-create query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMapping {
    /// Database row id; 0 until first persisted
    pub id: i64,
    /// Display name of the mapped object
    pub name: String,
    /// Local path this mapping covers (unique)
    pub local_path: PathBuf,
    /// Remote object backing the path
    pub remote_object_id: RemoteId,
    /// Remote parent the object lives under
    pub remote_parent_id: RemoteId,
}
