//! Port definitions (trait interfaces for adapters)
//!
//! Ports use `anyhow::Result` because errors at these boundaries are
//! adapter-specific and don't need domain-level classification.

pub mod object_store;
pub mod state_store;

pub use object_store::{IObjectStore, RemoteObject};
pub use state_store::IStateStore;
