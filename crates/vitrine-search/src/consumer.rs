//! The search consumer task.
//!
//! [`CatalogSearch`] holds the current index behind a shared handle and
//! rebuilds it wholesale whenever the synchronizer broadcasts a catalog
//! update. The index performs no merging of its own: it is a pure function
//! of the synchronizer's current snapshot, and rebuild cost is small
//! relative to the poll interval.

use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use vitrine_sync::{CacheSynchronizer, CatalogUpdated};

use crate::index::{CatalogIndex, SearchHit};

/// Shared, hot-swappable catalog search index.
///
/// Created once per process and handed to both the consumer task (which
/// swaps in rebuilt indexes) and any request handlers (which only read).
pub struct CatalogSearch {
    index: RwLock<Arc<CatalogIndex>>,
}

impl CatalogSearch {
    /// Creates an empty search handle; the first update populates it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Arc::new(CatalogIndex::build(Vec::new()))),
        }
    }

    /// Searches the current index, best hits first.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.current().search(query, limit)
    }

    /// Number of products in the current index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// True when the current index holds no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn current(&self) -> Arc<CatalogIndex> {
        match self.index.read() {
            Ok(guard) => guard.clone(),
            // A poisoned lock still holds a valid index; serve it.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn swap(&self, next: CatalogIndex) {
        let next = Arc::new(next);
        match self.index.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuilds the index from the synchronizer's cached snapshot.
    async fn rebuild_from(&self, sync: &CacheSynchronizer) {
        match sync.cached_snapshot().await {
            Ok(Some(records)) => {
                let count = records.len();
                self.swap(CatalogIndex::build(records));
                debug!(product_count = count, "rebuilt catalog search index");
            }
            Ok(None) => debug!("no cached snapshot yet, keeping current index"),
            Err(err) => warn!(error = %err, "failed to load snapshot for index rebuild"),
        }
    }

    /// Runs the consumer until shutdown: builds once from the current
    /// snapshot, then rebuilds on every update broadcast.
    pub async fn run(
        self: Arc<Self>,
        sync: Arc<CacheSynchronizer>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let _ = shutdown_rx.borrow_and_update();
        let mut updates = sync.subscribe();

        info!("starting catalog search consumer");
        self.rebuild_from(&sync).await;

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping search consumer");
                        break;
                    }
                    continue;
                }

                event = updates.recv() => match event {
                    Ok(CatalogUpdated { version }) => {
                        debug!(version = version.as_u64(), "catalog updated, rebuilding index");
                        self.rebuild_from(&sync).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed intermediate versions collapse into one
                        // rebuild from current state.
                        debug!(skipped, "search consumer lagged behind updates");
                        self.rebuild_from(&sync).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("update channel closed, stopping search consumer");
                        break;
                    }
                },
            }
        }
    }
}

impl Default for CatalogSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use vitrine_core::{Manifest, MemoryBackend, ProductId, ProductRecord, StorageBackend, Version, WritePrecondition};
    use vitrine_sync::{MemoryCacheStore, SyncConfig};

    fn product(id: &str, name: &str) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: name.to_string(),
            category: "general".to_string(),
            price: 1_000,
            stock_quantity: 1,
            image_ref: String::new(),
            description: String::new(),
            review_count: 0,
            rating: 0.0,
        }
    }

    async fn put_json<T: serde::Serialize>(remote: &MemoryBackend, key: &str, value: &T) {
        let bytes = Bytes::from(serde_json::to_vec(value).expect("serialize"));
        remote
            .put(key, bytes, WritePrecondition::None)
            .await
            .expect("put");
    }

    #[tokio::test]
    async fn rebuilds_after_an_update_broadcast() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", "Walnut desk")]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let cache = Arc::new(MemoryCacheStore::new());
        let sync = Arc::new(CacheSynchronizer::new(
            remote,
            cache,
            SyncConfig::default(),
        ));
        let search = Arc::new(CatalogSearch::new());
        assert!(search.is_empty());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(search.clone().run(sync.clone(), shutdown_rx));
        tokio::task::yield_now().await;

        sync.sync_cycle().await.expect("cycle");
        // Give the consumer a chance to observe the broadcast.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if !search.is_empty() {
                break;
            }
        }

        let hits = search.search("walnut", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id.as_str(), "1");

        shutdown_tx.send(true).expect("send shutdown");
        consumer.await.expect("join");
    }
}
