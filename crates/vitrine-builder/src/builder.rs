//! The snapshot builder.
//!
//! Turns the pending-changes queue into published artifacts: either a full
//! snapshot (collapsing diff history) or one more diff in the chain.
//!
//! The critical invariants are:
//! - Artifacts are durable before the manifest that references them is
//!   written (commit-last ordering)
//! - Manifest publication is gated by CAS on the manifest object's storage
//!   version token; a concurrent builder loses the race instead of silently
//!   clobbering the chain
//! - Queue rows are acknowledged only after the manifest publish, so a crash
//!   anywhere in the build reprocesses rows into an idempotent duplicate
//!   rather than dropping an update

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn, Instrument};
use ulid::Ulid;

use vitrine_core::observability::builder_span;
use vitrine_core::{
    DiffEntry, DiffKey, Manifest, ManifestKey, ProductId, SnapshotKey, StorageBackend, StorageKey,
    Version, WritePrecondition, WriteResult,
};

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::metrics::{self, MetricsSink, SnapshotMetric};
use crate::queue::ChangeQueue;
use crate::source::CatalogSource;

/// Whether a build published a full snapshot or a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// A full snapshot was published; the diff chain was reset.
    Full,
    /// One diff was appended to the chain.
    Diff,
}

impl BuildKind {
    /// Returns the metric label for this build type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Diff => "diff",
        }
    }
}

/// Result of a completed build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Whether a full snapshot or a diff was published.
    pub kind: BuildKind,
    /// The version the manifest now names.
    pub version: Version,
    /// Records in the published artifact.
    pub product_count: usize,
}

/// Outcome of a single publish attempt.
enum Attempt {
    Published(BuildOutcome),
    /// A concurrent builder updated the manifest between our read and our
    /// CAS write.
    Conflict,
}

/// Builds and publishes catalog snapshot artifacts.
///
/// Intended to run as a single active instance per interval (external
/// scheduler or an explicit force flag); overlapping invocations are safe
/// because the CAS gate makes the loser retry against fresh state.
///
/// The injected storage, queue, and catalog clients are expected to enforce
/// their own request deadlines and surface deadline overruns as their error
/// kinds; any such error aborts the build cleanly.
pub struct SnapshotBuilder {
    storage: Arc<dyn StorageBackend>,
    queue: Arc<dyn ChangeQueue>,
    source: Arc<dyn CatalogSource>,
    sink: Arc<dyn MetricsSink>,
    config: BuilderConfig,
}

impl SnapshotBuilder {
    /// Creates a builder over the given collaborators.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        queue: Arc<dyn ChangeQueue>,
        source: Arc<dyn CatalogSource>,
        sink: Arc<dyn MetricsSink>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            source,
            sink,
            config,
        }
    }

    /// Runs one build: decides full-vs-diff, publishes artifacts and the
    /// manifest, acknowledges the queue, and records a build metric.
    ///
    /// On a CAS conflict the whole decision process is retried once against
    /// the winner's manifest before surfacing
    /// [`BuildError::ManifestConflict`].
    ///
    /// # Errors
    ///
    /// Any storage, queue, or catalog failure aborts the build with no
    /// partial queue acknowledgment and no manifest write; the next
    /// invocation retries from scratch.
    pub async fn build(&self, force_full: bool) -> Result<BuildOutcome> {
        let span = builder_span("build", force_full);
        self.build_inner(force_full).instrument(span).await
    }

    async fn build_inner(&self, force_full: bool) -> Result<BuildOutcome> {
        let started = Instant::now();

        for attempt in 1..=2u32 {
            match self.attempt(force_full, started).await {
                Ok(Attempt::Published(outcome)) => {
                    metrics::record_build(outcome.kind, started.elapsed().as_secs_f64());
                    info!(
                        kind = outcome.kind.as_str(),
                        version = outcome.version.as_u64(),
                        product_count = outcome.product_count,
                        "published snapshot build"
                    );
                    return Ok(outcome);
                }
                Ok(Attempt::Conflict) if attempt == 1 => {
                    metrics::record_cas_retry();
                    debug!("manifest changed under us, retrying build decision");
                }
                Ok(Attempt::Conflict) => {
                    metrics::record_build_error("manifest_conflict");
                    return Err(BuildError::ManifestConflict {
                        message: "manifest updated by a concurrent builder on both attempts"
                            .to_string(),
                    });
                }
                Err(err) => {
                    metrics::record_build_error(error_label(&err));
                    return Err(err);
                }
            }
        }
        unreachable!("the attempt loop always returns")
    }

    /// One full decision-and-publish pass.
    async fn attempt(&self, force_full: bool, started: Instant) -> Result<Attempt> {
        let rows = self.queue.list_pending(self.config.queue_batch_limit).await?;
        let diff_count = rows.len();

        // Dedupe while preserving queue order; a product changed twice only
        // needs its latest state fetched once.
        let mut seen = BTreeSet::new();
        let changed_ids: Vec<ProductId> = rows
            .into_iter()
            .map(|r| r.product_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let (current, cas_token) = self.read_manifest_with_version().await?;

        // Zero changes bootstraps a baseline; exceeding the threshold means
        // reconstruction from the chain costs more than a fresh full fetch.
        // A populated queue with no manifest also has no baseline to diff
        // against, so it collapses to a full build as well.
        let should_full = force_full
            || diff_count == 0
            || diff_count > self.config.diff_threshold
            || current.is_none();

        let now_millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let version = Version::next_after(
            current.as_ref().map(|m| m.current_version),
            now_millis,
        );

        let attempt = if should_full {
            self.publish_full(version, cas_token, started, diff_count)
                .await?
        } else {
            // should_full rules out the None case above.
            let Some(current) = current else {
                return Err(BuildError::Storage {
                    message: "manifest disappeared during build".to_string(),
                });
            };
            self.publish_diff(&current, version, cas_token, started, diff_count, &changed_ids)
                .await?
        };

        if matches!(attempt, Attempt::Published(_)) {
            self.queue.acknowledge(&changed_ids).await?;
        }
        Ok(attempt)
    }

    async fn publish_full(
        &self,
        version: Version,
        cas_token: Option<String>,
        started: Instant,
        diff_count: usize,
    ) -> Result<Attempt> {
        let records = self.source.get_all().await?;
        let payload = to_json_bytes(&records)?;

        // Immutable versioned object first; a replayed build finding it
        // already present is a no-op.
        self.put_if_absent(SnapshotKey::versioned(version).key(), payload.clone())
            .await?;
        self.put_unconditional(SnapshotKey::latest().key(), payload.clone())
            .await?;

        let manifest = Manifest::full(version);
        if !self.publish_manifest(&manifest, cas_token).await? {
            return Ok(Attempt::Conflict);
        }

        self.record_metric(
            version,
            BuildKind::Full,
            records.len(),
            diff_count,
            &payload,
            started,
        )
        .await;

        Ok(Attempt::Published(BuildOutcome {
            kind: BuildKind::Full,
            version,
            product_count: records.len(),
        }))
    }

    async fn publish_diff(
        &self,
        current: &Manifest,
        version: Version,
        cas_token: Option<String>,
        started: Instant,
        diff_count: usize,
        changed_ids: &[ProductId],
    ) -> Result<Attempt> {
        let records = self.source.get_by_ids(changed_ids).await?;

        // Ids the authoritative store no longer has were deleted; publish
        // tombstones so caches drop them without waiting for a full rebuild.
        let found: BTreeSet<&ProductId> = records.iter().map(|r| &r.id).collect();
        let mut entries: Vec<DiffEntry> = Vec::with_capacity(changed_ids.len());
        for id in changed_ids {
            if !found.contains(id) {
                entries.push(DiffEntry::tombstone(id.clone()));
            }
        }
        entries.extend(records.iter().cloned().map(DiffEntry::Upsert));

        let diff_key = DiffKey::versioned(version);
        let payload = to_json_bytes(&entries)?;
        self.put_if_absent(diff_key.key(), payload.clone()).await?;

        let manifest = current.with_diff(version, diff_key.key());
        if !self.publish_manifest(&manifest, cas_token).await? {
            return Ok(Attempt::Conflict);
        }

        self.record_metric(
            version,
            BuildKind::Diff,
            entries.len(),
            diff_count,
            &payload,
            started,
        )
        .await;

        Ok(Attempt::Published(BuildOutcome {
            kind: BuildKind::Diff,
            version,
            product_count: entries.len(),
        }))
    }

    /// Reads the current manifest together with the version token needed for
    /// the CAS publish. Absent manifest means this is the bootstrap build.
    async fn read_manifest_with_version(&self) -> Result<(Option<Manifest>, Option<String>)> {
        let key = ManifestKey::current();
        let Some(meta) = self.storage.head(key.key()).await? else {
            return Ok((None, None));
        };

        let data = self.storage.get(key.key()).await?;
        let manifest: Manifest =
            serde_json::from_slice(&data).map_err(|e| BuildError::Serialization {
                message: format!("failed to parse manifest: {e}"),
            })?;
        Ok((Some(manifest), Some(meta.version)))
    }

    /// CAS-writes the manifest. Returns `false` when a concurrent builder
    /// won the race.
    async fn publish_manifest(
        &self,
        manifest: &Manifest,
        cas_token: Option<String>,
    ) -> Result<bool> {
        let payload = to_json_bytes(manifest)?;
        let precondition = match cas_token {
            Some(token) => WritePrecondition::MatchesVersion(token),
            None => WritePrecondition::DoesNotExist,
        };

        let result = self
            .storage
            .put(ManifestKey::current().key(), payload, precondition)
            .await?;

        Ok(matches!(result, WriteResult::Success { .. }))
    }

    async fn put_if_absent(&self, key: &str, data: Bytes) -> Result<()> {
        match self
            .storage
            .put(key, data, WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { .. } | WriteResult::PreconditionFailed { .. } => Ok(()),
        }
    }

    async fn put_unconditional(&self, key: &str, data: Bytes) -> Result<()> {
        match self.storage.put(key, data, WritePrecondition::None).await? {
            WriteResult::Success { .. } | WriteResult::PreconditionFailed { .. } => Ok(()),
        }
    }

    async fn record_metric(
        &self,
        version: Version,
        kind: BuildKind,
        product_count: usize,
        diff_count: usize,
        payload: &Bytes,
        started: Instant,
    ) {
        let metric = SnapshotMetric {
            commit_id: Ulid::new().to_string(),
            version,
            build_type: kind,
            product_count,
            build_millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            diff_count,
            checksum_sha256: sha256_hex(payload),
            recorded_at: Utc::now(),
        };

        // The build has already committed; a lost audit row is logged, not
        // surfaced.
        if let Err(err) = self.sink.record(metric).await {
            warn!(error = %err, "failed to record build metric");
        }
    }
}

fn to_json_bytes<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| BuildError::Serialization {
            message: format!("failed to serialize artifact: {e}"),
        })
}

fn sha256_hex(bytes: &Bytes) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn error_label(err: &BuildError) -> &'static str {
    match err {
        BuildError::Storage { .. } => "storage",
        BuildError::QueueUnavailable { .. } => "queue",
        BuildError::CatalogRead { .. } => "catalog_read",
        BuildError::Serialization { .. } => "serialization",
        BuildError::ManifestConflict { .. } => "manifest_conflict",
    }
}
