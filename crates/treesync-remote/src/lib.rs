//! TreeSync Remote - Object-store API client
//!
//! HTTP adapter for the remote object-storage service the mirror
//! replicates into. Implements the `IObjectStore` port from
//! `treesync-core` on top of `reqwest`.
//!
//! ## Endpoints
//!
//! - `GET /objects?parentId=&name=&excludeTrashed=` - filtered listing
//! - `POST /folders` - create a folder from metadata
//! - `POST /files?parentId=&name=` - upload whole file content
//! - `DELETE /objects/{id}` - delete by id
//!
//! Requests carry the credential value as a bearer token.

pub mod client;

pub use client::ObjectStoreClient;

/// Errors produced by the object-store adapter
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with a non-success status
    #[error("Service returned {status}: {message}")]
    ServiceError { status: u16, message: String },

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
