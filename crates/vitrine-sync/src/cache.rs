//! Durable client-side cache contract.
//!
//! Each client process holds its merged snapshot and the manifest it was
//! built from in a durable cache under fixed keys. The store is
//! constructor-injected and passed by reference to the synchronizer and any
//! consumers: created once per process, no hidden statics.
//!
//! Lifecycle: entries are created on the first successful poll, updated in
//! place on every accepted newer manifest, and never explicitly destroyed
//! (bounded by the host's cache eviction policy).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, SyncError};

/// Fixed keys for the cached client state.
pub mod cache_keys {
    /// The locally cached manifest.
    pub const MANIFEST: &str = "data/manifest.json";
    /// The locally cached merged snapshot.
    pub const SNAPSHOT: &str = "data/products.json";
}

/// Contract for the durable local cache.
///
/// Production implementations sit on whatever durable storage the host
/// offers; tests use [`MemoryCacheStore`].
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Reads a cached entry, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] if the cache cannot be read.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Writes a cached entry, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] if the cache cannot be written.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;
}

/// In-memory cache store for testing.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryCacheStore {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let entries = self.entries.read().map_err(|_| SyncError::Cache {
            message: "lock poisoned".into(),
        })?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| SyncError::Cache {
                message: "lock poisoned".into(),
            })?
            .insert(key.to_string(), data);
        Ok(())
    }
}
