//! Authoritative catalog read contract.
//!
//! The relational store that owns products is an external collaborator; the
//! builder only needs two read operations from it. `get_by_ids` returns only
//! the ids that still exist, which is how the builder detects deletions and
//! turns them into tombstones.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use vitrine_core::{ProductId, ProductRecord};

use crate::error::{BuildError, Result};

/// Read access to the authoritative product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    /// Fetches the entire catalog, denormalized to the published record
    /// shape.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CatalogRead`] if the catalog cannot be read.
    async fn get_all(&self) -> Result<Vec<ProductRecord>>;

    /// Fetches the records for the given ids.
    ///
    /// Ids with no corresponding row are absent from the result; the caller
    /// treats them as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CatalogRead`] if the catalog cannot be read.
    async fn get_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>>;
}

/// In-memory catalog source for testing.
#[derive(Debug, Default)]
pub struct MemoryCatalogSource {
    products: RwLock<BTreeMap<ProductId, ProductRecord>>,
}

impl MemoryCatalogSource {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    pub fn upsert(&self, record: ProductRecord) {
        self.products
            .write()
            .expect("lock poisoned")
            .insert(record.id.clone(), record);
    }

    /// Removes a product, as a deletion in the authoritative store would.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    pub fn remove(&self, id: &ProductId) {
        self.products.write().expect("lock poisoned").remove(id);
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalogSource {
    async fn get_all(&self) -> Result<Vec<ProductRecord>> {
        let products = self.products.read().map_err(|_| BuildError::CatalogRead {
            message: "lock poisoned".into(),
        })?;
        Ok(products.values().cloned().collect())
    }

    async fn get_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        let products = self.products.read().map_err(|_| BuildError::CatalogRead {
            message: "lock poisoned".into(),
        })?;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}
