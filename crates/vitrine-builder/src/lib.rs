//! # vitrine-builder
//!
//! Server-side snapshot builder for the Vitrine catalog replication
//! protocol.
//!
//! The builder turns the authoritative, frequently-changing product table
//! into versioned, downloadable artifacts: either a full snapshot or one
//! more diff in the chain described by the manifest. Each build:
//!
//! 1. Reads pending rows from the externally populated change queue
//! 2. Decides full-vs-diff (`force` flag, empty queue, or diff threshold)
//! 3. Writes the artifact objects (durable before the manifest)
//! 4. Publishes the manifest via CAS on its storage version token
//! 5. Acknowledges the queue rows and records a build metric
//!
//! ## Concurrency
//!
//! Two builds may overlap (a scheduled run and a manually forced one). The
//! CAS gate on the manifest makes the loser retry its whole decision once
//! against the winner's manifest; if it loses again the build surfaces
//! [`BuildError::ManifestConflict`]. Losing builds leave only orphan
//! artifact blobs, never a visible half-publish.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod source;

pub use builder::{BuildKind, BuildOutcome, SnapshotBuilder};
pub use config::BuilderConfig;
pub use error::{BuildError, Result};
pub use metrics::{MemoryMetricsSink, MetricsSink, SnapshotMetric};
pub use queue::{ChangeQueue, ChangeQueueRow, MemoryChangeQueue};
pub use source::{CatalogSource, MemoryCatalogSource};
