//! Build metrics.
//!
//! Two layers, matching the rest of the observability stack:
//!
//! - counters/histograms via the `metrics` facade, for dashboards
//! - an append-only [`SnapshotMetric`] audit record per build, written to a
//!   [`MetricsSink`], for the build history the admin dashboard reads

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use vitrine_core::Version;

use crate::builder::BuildKind;
use crate::error::{BuildError, Result};

/// Completed-build counter, labeled by build type.
pub const BUILDS_TOTAL: &str = "vitrine_builds_total";

/// Build duration histogram.
pub const BUILD_DURATION: &str = "vitrine_build_duration_seconds";

/// Aborted-build counter.
pub const BUILD_ERRORS: &str = "vitrine_build_errors_total";

/// Manifest CAS retry counter.
pub const CAS_RETRY: &str = "vitrine_manifest_cas_retry_total";

/// Registers all builder metric descriptions.
///
/// Call once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(BUILDS_TOTAL, "Total completed snapshot builds");
    describe_histogram!(BUILD_DURATION, "Duration of snapshot builds in seconds");
    describe_counter!(BUILD_ERRORS, "Total aborted snapshot builds");
    describe_counter!(CAS_RETRY, "Total manifest CAS retry attempts");
}

/// Records a completed build.
pub fn record_build(kind: BuildKind, duration_secs: f64) {
    let labels = [("type", kind.as_str())];
    counter!(BUILDS_TOTAL, &labels).increment(1);
    histogram!(BUILD_DURATION, &labels).record(duration_secs);
}

/// Records an aborted build.
pub fn record_build_error(kind: &str) {
    counter!(BUILD_ERRORS, "error" => kind.to_string()).increment(1);
}

/// Records a manifest CAS retry.
pub fn record_cas_retry() {
    counter!(CAS_RETRY).increment(1);
}

/// Append-only audit record written once per build, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetric {
    /// Commit identifier for this build (ULID, sortable by time).
    pub commit_id: String,
    /// The version the build published.
    pub version: Version,
    /// Whether a full snapshot or a diff was published.
    pub build_type: BuildKind,
    /// Number of product records in the published artifact.
    pub product_count: usize,
    /// Wall-clock build duration in milliseconds.
    pub build_millis: u64,
    /// Number of change rows folded into this build.
    pub diff_count: usize,
    /// SHA-256 hex digest of the published artifact.
    pub checksum_sha256: String,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Sink for per-build audit records.
///
/// The production sink appends to the metrics table the admin dashboard
/// reads; tests use [`MemoryMetricsSink`].
#[async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    /// Appends one build record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted. The builder treats
    /// this as non-fatal: the build has already committed.
    async fn record(&self, metric: SnapshotMetric) -> Result<()>;
}

/// In-memory metrics sink for testing.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    records: RwLock<Vec<SnapshotMetric>>,
}

impl MemoryMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded metrics, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    #[must_use]
    pub fn records(&self) -> Vec<SnapshotMetric> {
        self.records.read().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl MetricsSink for MemoryMetricsSink {
    async fn record(&self, metric: SnapshotMetric) -> Result<()> {
        self.records
            .write()
            .map_err(|_| BuildError::Storage {
                message: "lock poisoned".into(),
            })?
            .push(metric);
        Ok(())
    }
}
