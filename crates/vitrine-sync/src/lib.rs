//! # vitrine-sync
//!
//! Client-side cache synchronizer for the Vitrine catalog replication
//! protocol.
//!
//! Each client process runs one [`CacheSynchronizer`]: a background task
//! that polls the remote manifest on an interval, fetches only the diffs
//! not yet folded locally, merges them into the durably cached snapshot,
//! and broadcasts a [`CatalogUpdated`] event to co-resident consumers
//! (search index, catalog readers).
//!
//! ## Consistency
//!
//! The synchronizer provides eventual consistency: every client converges
//! to the authoritative state within (poll interval × outstanding diffs),
//! with the builder's diff threshold bounding how long a chain can grow.
//! It does not provide strong consistency or read-your-writes; a cycle
//! that fails leaves the last known-good state untouched.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod synchronizer;

pub use cache::{cache_keys, CacheStore, MemoryCacheStore};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use synchronizer::{CacheSynchronizer, CatalogUpdated, CycleOutcome};
