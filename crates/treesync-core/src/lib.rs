//! TreeSync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Node`, `WatchRoot`, `RemoteMapping`, `Credential`
//! - **Path rules** - hidden-path detection and separator-bounded ancestry
//! - **Port definitions** - Traits for adapters: `IStateStore`, `IObjectStore`
//! - **Configuration** - typed YAML configuration with defaults and validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates (`treesync-store`,
//! `treesync-remote`) implement. The reconciliation engine in
//! `treesync-engine` orchestrates domain entities through the ports.

pub mod config;
pub mod domain;
pub mod ports;
