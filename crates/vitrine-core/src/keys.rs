//! Typed storage keys for the published artifact layout.
//!
//! Keys encode the blob-store layout at the type level so wrong paths cannot
//! be constructed from bare strings.
//!
//! # Layout
//!
//! ```text
//! manifest.json               # Commit record: current version + diff chain
//! products.json               # Mutable latest-snapshot alias
//! products-<version>.json     # Immutable versioned snapshot
//! diff/<version>.json         # Immutable diff set
//! ```

use crate::manifest::Version;

/// A typed storage key that encodes path structure.
pub trait StorageKey: AsRef<str> {
    /// Returns the underlying key string.
    fn key(&self) -> &str {
        self.as_ref()
    }
}

macro_rules! impl_key {
    ($ty:ident) => {
        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl StorageKey for $ty {}

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// A typed key for full-snapshot objects.
///
/// # Access
///
/// - **Write**: builder only
/// - **Read**: builder, synchronizer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    /// The mutable latest-snapshot alias, `products.json`.
    #[must_use]
    pub fn latest() -> Self {
        Self("products.json".to_string())
    }

    /// An immutable versioned snapshot, `products-<version>.json`.
    #[must_use]
    pub fn versioned(version: Version) -> Self {
        Self(format!("products-{version}.json"))
    }
}

impl_key!(SnapshotKey);

/// A typed key for diff-set objects, `diff/<version>.json`.
///
/// Diff objects are immutable once written; the manifest's diff chain stores
/// these keys verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffKey(String);

impl DiffKey {
    /// The diff set published at `version`.
    #[must_use]
    pub fn versioned(version: Version) -> Self {
        Self(format!("diff/{version}.json"))
    }

    /// The prefix under which all diff objects live.
    #[must_use]
    pub fn prefix() -> &'static str {
        "diff/"
    }
}

impl_key!(DiffKey);

/// A typed key for the manifest commit record, `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestKey(String);

impl ManifestKey {
    /// The single current-manifest object.
    #[must_use]
    pub fn current() -> Self {
        Self("manifest.json".to_string())
    }
}

impl_key!(ManifestKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let v = Version::from_raw(1_700_000_000_000);
        assert_eq!(SnapshotKey::latest().as_ref(), "products.json");
        assert_eq!(
            SnapshotKey::versioned(v).as_ref(),
            "products-1700000000000.json"
        );
        assert_eq!(DiffKey::versioned(v).as_ref(), "diff/1700000000000.json");
        assert!(DiffKey::versioned(v).as_ref().starts_with(DiffKey::prefix()));
        assert_eq!(ManifestKey::current().as_ref(), "manifest.json");
    }
}
