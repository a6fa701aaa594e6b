//! Domain error types

use std::path::PathBuf;

/// Errors produced by domain rules and entity constructors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// A path contains a segment beginning with the hidden marker (`.`)
    ///
    /// Signaled by the tree scanner. Non-fatal during descent (the subtree
    /// is skipped); propagated to the caller when the hidden path was
    /// requested explicitly.
    #[error("{0} is a hidden path")]
    HiddenPath(PathBuf),

    /// An identifier string failed validation
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
