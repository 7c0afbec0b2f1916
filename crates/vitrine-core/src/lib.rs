//! # vitrine-core
//!
//! Shared contracts for the Vitrine catalog snapshot replication protocol.
//!
//! This crate provides the types and traits used by both sides of the
//! protocol:
//!
//! - **Storage Backend**: the blob-store abstraction with CAS preconditions
//! - **Typed Keys**: compile-time-safe artifact key construction
//! - **Catalog Types**: the product record and diff-entry wire shapes
//! - **Manifest Protocol**: the versioning contract (`decide` + `fold`)
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `vitrine-core` is the **only** crate allowed to define shared primitives.
//! The builder and synchronizer must implement the manifest protocol
//! identically, so both depend on this single definition.
//!
//! ## Artifact Layout
//!
//! ```text
//! manifest.json               # Commit record: current version + diff chain
//! products.json               # Mutable latest-snapshot alias
//! products-<version>.json     # Immutable versioned snapshot
//! diff/<version>.json         # Immutable diff set
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{DiffEntry, ProductId, ProductRecord};
    pub use crate::error::{Error, Result};
    pub use crate::keys::{DiffKey, ManifestKey, SnapshotKey, StorageKey};
    pub use crate::manifest::{decide, fold, Manifest, SyncAction, Version};
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

pub use catalog::{DiffEntry, ProductId, ProductRecord};
pub use error::{Error, Result};
pub use keys::{DiffKey, ManifestKey, SnapshotKey, StorageKey};
pub use manifest::{decide, fold, Manifest, SyncAction, Version};
pub use observability::{init_logging, LogFormat};
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult};
