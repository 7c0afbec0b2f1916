//! The manifest protocol: the versioning contract both sides implement
//! identically.
//!
//! The manifest is the single commit record of the replication protocol.
//! Artifacts (snapshots, diffs) are durable *before* the manifest that
//! references them is written, so a crash mid-publish leaves orphan blobs but
//! never a manifest pointing at a missing object.
//!
//! Two operations define the contract:
//!
//! - [`decide`]: whether a remote manifest supersedes the locally cached one
//! - [`fold`]: merging a diff set onto a base snapshot, keyed by product id
//!
//! `fold` is idempotent and commutative only by id: the last-applied entry
//! for a given id wins, so diffs must be folded in manifest order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{DiffEntry, ProductId, ProductRecord};

/// A monotonically increasing snapshot version.
///
/// Versions are time-shaped (milliseconds since epoch) for operator
/// ergonomics, but allocation via [`Version::next_after`] guarantees
/// monotonicity even when the wall clock regresses between builds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Creates a version from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Allocates the next version after `prev` given the current wall clock.
    ///
    /// Returns `max(prev + 1, now_millis)`: strictly greater than `prev`
    /// regardless of clock skew, and aligned with wall time whenever the
    /// clock is ahead of the version history.
    #[must_use]
    pub fn next_after(prev: Option<Version>, now_millis: u64) -> Self {
        let floor = prev.map_or(0, |v| v.0 + 1);
        Self(floor.max(now_millis))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The manifest commit record.
///
/// `current_version` names the most recently published artifact, full or
/// diff. `diffs` is the ordered list of diff object keys that must be folded
/// onto the last full snapshot to reconstruct the current state; it is reset
/// to empty exactly when a full rebuild is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// The most recently published version.
    pub current_version: Version,
    /// Ordered diff object keys since the last full rebuild.
    pub diffs: Vec<String>,
}

impl Manifest {
    /// The manifest published by a full rebuild: empty diff chain.
    #[must_use]
    pub fn full(version: Version) -> Self {
        Self {
            current_version: version,
            diffs: Vec::new(),
        }
    }

    /// Returns a copy with `diff_key` appended and the version advanced.
    #[must_use]
    pub fn with_diff(&self, version: Version, diff_key: impl Into<String>) -> Self {
        let mut diffs = self.diffs.clone();
        diffs.push(diff_key.into());
        Self {
            current_version: version,
            diffs,
        }
    }
}

/// The outcome of comparing a remote manifest against local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The remote manifest does not supersede local state; nothing to do.
    NoOp,
    /// The remote manifest is newer and must be applied.
    Apply,
}

/// Decides whether `remote` supersedes the locally cached manifest.
///
/// An absent local manifest compares as older than everything, so the first
/// poll always applies.
#[must_use]
pub fn decide(local: Option<&Manifest>, remote: &Manifest) -> SyncAction {
    match local {
        Some(local) if remote.current_version <= local.current_version => SyncAction::NoOp,
        _ => SyncAction::Apply,
    }
}

/// Folds a diff set onto a base snapshot, keyed by product id.
///
/// Upserts overwrite or insert; tombstones remove. The result is returned in
/// stable id order. Applying the same diff twice yields the same result, but
/// diffs touching the same id are order-sensitive: the last applied wins.
#[must_use]
pub fn fold(base: Vec<ProductRecord>, diff: &[DiffEntry]) -> Vec<ProductRecord> {
    let mut by_id: BTreeMap<ProductId, ProductRecord> =
        base.into_iter().map(|r| (r.id.clone(), r)).collect();

    for entry in diff {
        match entry {
            DiffEntry::Upsert(record) => {
                by_id.insert(record.id.clone(), record.clone());
            }
            DiffEntry::Tombstone { id, .. } => {
                by_id.remove(id);
            }
        }
    }

    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: format!("product {id}"),
            category: "general".to_string(),
            price,
            stock_quantity: 5,
            image_ref: format!("media/{id}.jpg"),
            description: String::new(),
            review_count: 0,
            rating: 0.0,
        }
    }

    #[test]
    fn manifest_wire_shape() {
        let manifest = Manifest::full(Version::from_raw(42)).with_diff(Version::from_raw(43), "diff/43.json");
        let json = serde_json::to_value(&manifest).expect("serialize");
        assert_eq!(json["currentVersion"], 43);
        assert_eq!(json["diffs"][0], "diff/43.json");
    }

    #[test]
    fn full_manifest_resets_diff_chain() {
        let manifest = Manifest::full(Version::from_raw(1)).with_diff(Version::from_raw(2), "diff/2.json");
        assert_eq!(manifest.diffs.len(), 1);
        assert!(Manifest::full(Version::from_raw(3)).diffs.is_empty());
    }

    #[test]
    fn decide_applies_only_newer_versions() {
        let local = Manifest::full(Version::from_raw(10));
        let older = Manifest::full(Version::from_raw(9));
        let same = Manifest::full(Version::from_raw(10));
        let newer = Manifest::full(Version::from_raw(11));

        assert_eq!(decide(Some(&local), &older), SyncAction::NoOp);
        assert_eq!(decide(Some(&local), &same), SyncAction::NoOp);
        assert_eq!(decide(Some(&local), &newer), SyncAction::Apply);
        assert_eq!(decide(None, &older), SyncAction::Apply);
    }

    #[test]
    fn fold_is_idempotent() {
        let base = vec![product("1", 100), product("2", 200)];
        let diff = vec![
            DiffEntry::Upsert(product("2", 250)),
            DiffEntry::Upsert(product("3", 300)),
        ];

        let once = fold(base.clone(), &diff);
        let twice = fold(once.clone(), &diff);
        assert_eq!(once, twice);
    }

    #[test]
    fn fold_is_order_sensitive_per_id() {
        let base = vec![product("1", 100)];
        let d1 = vec![DiffEntry::Upsert(product("1", 150))];
        let d2 = vec![DiffEntry::Upsert(product("1", 175))];

        let merged = fold(fold(base, &d1), &d2);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].price, 175, "the later diff wins for a shared id");
    }

    #[test]
    fn fold_removes_tombstoned_ids() {
        let base = vec![product("1", 100), product("2", 200)];
        let diff = vec![
            DiffEntry::tombstone(ProductId::new("1")),
            DiffEntry::Upsert(product("3", 300)),
        ];

        let merged = fold(base, &diff);
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn fold_inserts_into_empty_base() {
        let merged = fold(Vec::new(), &[DiffEntry::Upsert(product("7", 700))]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.as_str(), "7");
    }

    #[test]
    fn version_allocation_is_monotonic_under_clock_regression() {
        let v1 = Version::next_after(None, 1_000);
        assert_eq!(v1.as_u64(), 1_000);

        // Clock regressed below the last version.
        let v2 = Version::next_after(Some(v1), 500);
        assert_eq!(v2.as_u64(), 1_001);

        // Clock ahead again.
        let v3 = Version::next_after(Some(v2), 5_000);
        assert_eq!(v3.as_u64(), 5_000);
    }
}
