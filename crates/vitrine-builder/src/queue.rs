//! Change queue contract.
//!
//! The pending-changes queue is populated externally (change data capture on
//! the authoritative product table) and consumed only by the builder: rows
//! are read, turned into a diff artifact, and acknowledged after the manifest
//! publish commits them. Acknowledged rows are never re-read, so a crash
//! between publish and acknowledgment reprocesses rows into a harmless
//! duplicate diff rather than dropping an update.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use vitrine_core::ProductId;

use crate::error::{BuildError, Result};

/// One pending change row: a product whose state changed since the last
/// acknowledged build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQueueRow {
    /// The product that changed.
    pub product_id: ProductId,
}

/// Contract for the externally populated change queue.
#[async_trait]
pub trait ChangeQueue: Send + Sync + 'static {
    /// Reads up to `limit` unacknowledged rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::QueueUnavailable`] if the queue cannot be read.
    async fn list_pending(&self, limit: usize) -> Result<Vec<ChangeQueueRow>>;

    /// Marks the rows for the given product ids as processed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::QueueUnavailable`] if the acknowledgment fails.
    async fn acknowledge(&self, product_ids: &[ProductId]) -> Result<()>;
}

/// In-memory change queue for testing.
#[derive(Debug, Default)]
pub struct MemoryChangeQueue {
    // Keyed by insertion sequence so list_pending returns oldest first.
    rows: RwLock<BTreeMap<u64, PendingRow>>,
}

#[derive(Debug, Clone)]
struct PendingRow {
    product_id: ProductId,
    processed: bool,
}

impl MemoryChangeQueue {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending row for `product_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    pub fn push(&self, product_id: ProductId) {
        let mut rows = self.rows.write().expect("lock poisoned");
        let seq = rows.last_key_value().map_or(0, |(k, _)| k + 1);
        rows.insert(
            seq,
            PendingRow {
                product_id,
                processed: false,
            },
        );
    }

    /// Returns the number of unacknowledged rows.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.rows
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|r| !r.processed)
            .count()
    }
}

#[async_trait]
impl ChangeQueue for MemoryChangeQueue {
    async fn list_pending(&self, limit: usize) -> Result<Vec<ChangeQueueRow>> {
        let rows = self.rows.read().map_err(|_| BuildError::QueueUnavailable {
            message: "lock poisoned".into(),
        })?;

        Ok(rows
            .values()
            .filter(|r| !r.processed)
            .take(limit)
            .map(|r| ChangeQueueRow {
                product_id: r.product_id.clone(),
            })
            .collect())
    }

    async fn acknowledge(&self, product_ids: &[ProductId]) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| BuildError::QueueUnavailable {
            message: "lock poisoned".into(),
        })?;

        for row in rows.values_mut() {
            if product_ids.contains(&row.product_id) {
                row.processed = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_rows_are_oldest_first_and_bounded() {
        let queue = MemoryChangeQueue::new();
        for id in ["a", "b", "c"] {
            queue.push(ProductId::new(id));
        }

        let rows = queue.list_pending(2).await.expect("list");
        let ids: Vec<_> = rows.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn acknowledged_rows_are_not_re_read() {
        let queue = MemoryChangeQueue::new();
        queue.push(ProductId::new("a"));
        queue.push(ProductId::new("b"));

        queue
            .acknowledge(&[ProductId::new("a")])
            .await
            .expect("acknowledge");

        let rows = queue.list_pending(10).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id.as_str(), "b");
        assert_eq!(queue.pending_len(), 1);
    }
}
