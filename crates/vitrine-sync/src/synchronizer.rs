//! The cache synchronizer.
//!
//! Runs inside each client process: polls the remote manifest, fetches only
//! the diffs it has not folded yet, merges them into the locally cached
//! snapshot, and broadcasts freshness to co-resident consumers.
//!
//! A cycle that fails anywhere leaves the last known-good cached state
//! untouched and is retried at the next interval; stale-but-available local
//! state is always preferred over blocking. The common case — nothing new —
//! costs one small manifest fetch.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn, Instrument};

use vitrine_core::observability::sync_span;
use vitrine_core::{
    decide, fold, DiffEntry, Manifest, ManifestKey, ProductRecord, SnapshotKey, StorageBackend, StorageKey,
    SyncAction, Version,
};

use crate::cache::{cache_keys, CacheStore};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::metrics;

/// Broadcast to all co-resident consumers after a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUpdated {
    /// The version the local cache now holds.
    pub version: Version,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The remote manifest did not supersede local state.
    NoOp,
    /// A newer manifest was applied to the local cache.
    Applied {
        /// The version now cached.
        version: Version,
        /// Diff sets folded during this cycle.
        diffs_applied: usize,
        /// Whether the base snapshot was refetched from `products.json`
        /// instead of extending the cached one.
        bootstrapped: bool,
    },
}

/// Capacity of the update broadcast channel. Consumers that fall behind see
/// a lag error and resubscribe from current state.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Polls the remote blob store and maintains the local merged snapshot.
///
/// All state is constructor-injected; one synchronizer instance per process
/// coordinates the shared cache, and consumers listen on [`subscribe`]
/// rather than polling themselves.
///
/// [`subscribe`]: CacheSynchronizer::subscribe
pub struct CacheSynchronizer {
    remote: Arc<dyn StorageBackend>,
    cache: Arc<dyn CacheStore>,
    updates: broadcast::Sender<CatalogUpdated>,
    config: SyncConfig,
}

impl CacheSynchronizer {
    /// Creates a synchronizer over the given remote store and local cache.
    #[must_use]
    pub fn new(
        remote: Arc<dyn StorageBackend>,
        cache: Arc<dyn CacheStore>,
        config: SyncConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            remote,
            cache,
            updates,
            config,
        }
    }

    /// Subscribes to catalog update broadcasts.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogUpdated> {
        self.updates.subscribe()
    }

    /// Returns the locally cached snapshot, if one exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or the cached snapshot
    /// fails to parse.
    pub async fn cached_snapshot(&self) -> Result<Option<Vec<ProductRecord>>> {
        match self.cache.get(cache_keys::SNAPSHOT).await? {
            Some(bytes) => Ok(Some(parse_json(&bytes, "cached snapshot")?)),
            None => Ok(None),
        }
    }

    /// Executes one sync cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when a fetch times out, an artifact fails to parse,
    /// or storage/cache access fails. The cached state is never modified on
    /// the error path.
    pub async fn sync_cycle(&self) -> Result<CycleOutcome> {
        let local_manifest = self.load_cached_manifest().await?;
        let span = sync_span(
            "cycle",
            local_manifest.as_ref().map(|m| m.current_version.as_u64()),
        );
        self.cycle_inner(local_manifest).instrument(span).await
    }

    async fn cycle_inner(&self, local_manifest: Option<Manifest>) -> Result<CycleOutcome> {
        let started = Instant::now();

        let Some(remote_manifest) = self.fetch_manifest().await? else {
            // Nothing published yet; the builder has not bootstrapped.
            debug!("no remote manifest, skipping cycle");
            return Ok(CycleOutcome::NoOp);
        };

        if decide(local_manifest.as_ref(), &remote_manifest) == SyncAction::NoOp {
            metrics::record_cycle("noop", 0, started.elapsed().as_secs_f64());
            return Ok(CycleOutcome::NoOp);
        }

        // Extend the cached snapshot when the remote chain is a strict
        // extension of what was already folded; otherwise (first poll, or a
        // full rebuild collapsed the chain) start over from the latest
        // full-snapshot alias.
        let (base, pending, bootstrapped) =
            match self.incremental_base(local_manifest.as_ref(), &remote_manifest).await? {
                Some((base, pending)) => (base, pending, false),
                None => {
                    let bytes = self.fetch_remote(SnapshotKey::latest().key()).await?;
                    let base: Vec<ProductRecord> = parse_json(&bytes, "full snapshot")?;
                    (base, remote_manifest.diffs.clone(), true)
                }
            };

        let mut snapshot = base;
        let diffs_applied = pending.len();
        for diff_key in &pending {
            let bytes = self.fetch_remote(diff_key).await?;
            let entries: Vec<DiffEntry> = parse_json(&bytes, "diff set")?;
            snapshot = fold(snapshot, &entries);
        }

        // Snapshot first, manifest second: a reader between the two writes
        // sees old-manifest/new-snapshot, which is stale but self-consistent.
        self.store_cached(cache_keys::SNAPSHOT, &snapshot).await?;
        self.store_cached(cache_keys::MANIFEST, &remote_manifest).await?;

        let version = remote_manifest.current_version;
        let _ = self.updates.send(CatalogUpdated { version });

        metrics::record_cycle("applied", diffs_applied, started.elapsed().as_secs_f64());
        info!(
            version = version.as_u64(),
            diffs_applied,
            bootstrapped,
            product_count = snapshot.len(),
            "applied catalog update"
        );

        Ok(CycleOutcome::Applied {
            version,
            diffs_applied,
            bootstrapped,
        })
    }

    /// Runs the polling loop until shutdown is signaled.
    ///
    /// One cycle runs at activation (the interval's first tick is
    /// immediate), then one per interval. Cycle errors are logged and
    /// counted, never propagated.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        // Mark the initial value as seen so changed() only fires on actual
        // changes.
        let _ = shutdown_rx.borrow_and_update();

        let interval = self.config.poll_interval();
        info!(
            interval_secs = interval.as_secs(),
            "starting catalog sync task"
        );

        let mut timer = tokio::time::interval(interval);
        // Skip missed ticks instead of bursting to catch up.
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping sync task");
                        break;
                    }
                    continue;
                }

                _ = timer.tick() => {}
            }

            match self.sync_cycle().await {
                Ok(CycleOutcome::NoOp) => {}
                Ok(CycleOutcome::Applied { version, .. }) => {
                    debug!(version = version.as_u64(), "sync cycle applied an update");
                }
                Err(err) => {
                    metrics::record_cycle_error(err.as_label());
                    debug!(error = %err, "sync cycle aborted, will retry next interval");
                }
            }
        }
    }

    /// Fetches the remote manifest, `None` when nothing has been published.
    async fn fetch_manifest(&self) -> Result<Option<Manifest>> {
        let key = ManifestKey::current();
        let deadline = self.config.fetch_timeout();
        match tokio::time::timeout(deadline, self.remote.get(key.key())).await {
            Ok(Ok(bytes)) => Ok(Some(parse_json(&bytes, "manifest")?)),
            Ok(Err(err)) if err.is_not_found() => Ok(None),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(SyncError::NetworkTimeout {
                message: format!("fetching {key}"),
            }),
        }
    }

    async fn fetch_remote(&self, key: &str) -> Result<Bytes> {
        match tokio::time::timeout(self.config.fetch_timeout(), self.remote.get(key)).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::NetworkTimeout {
                message: format!("fetching {key}"),
            }),
        }
    }

    /// Returns the cached snapshot plus the tail of diffs still to fold,
    /// when the remote chain strictly extends the locally applied one.
    async fn incremental_base(
        &self,
        local: Option<&Manifest>,
        remote: &Manifest,
    ) -> Result<Option<(Vec<ProductRecord>, Vec<String>)>> {
        let Some(local) = local else {
            return Ok(None);
        };

        // A full rebuild resets the chain; equal or shorter remote chains
        // mean the version advanced some other way than appending diffs.
        let extends = remote.diffs.len() > local.diffs.len()
            && remote.diffs[..local.diffs.len()] == local.diffs[..];
        if !extends {
            return Ok(None);
        }

        let Some(bytes) = self.cache.get(cache_keys::SNAPSHOT).await? else {
            return Ok(None);
        };
        let base: Vec<ProductRecord> = parse_json(&bytes, "cached snapshot")?;
        let pending = remote.diffs[local.diffs.len()..].to_vec();
        Ok(Some((base, pending)))
    }

    async fn load_cached_manifest(&self) -> Result<Option<Manifest>> {
        let Some(bytes) = self.cache.get(cache_keys::MANIFEST).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) => {
                // A corrupt cached manifest only costs a re-bootstrap.
                warn!(error = %err, "cached manifest is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    async fn store_cached<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| SyncError::CorruptArtifact {
            message: format!("failed to serialize {key}: {e}"),
        })?;
        self.cache.put(key, Bytes::from(bytes)).await
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &Bytes, what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| SyncError::CorruptArtifact {
        message: format!("failed to parse {what}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vitrine_core::{
        DiffEntry, MemoryBackend, ObjectMeta, ProductId, WritePrecondition,
    };

    fn product(id: &str, price: i64) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: format!("product {id}"),
            category: "general".to_string(),
            price,
            stock_quantity: 3,
            image_ref: format!("media/{id}.jpg"),
            description: String::new(),
            review_count: 0,
            rating: 0.0,
        }
    }

    async fn put_json<T: Serialize>(remote: &MemoryBackend, key: &str, value: &T) {
        let bytes = Bytes::from(serde_json::to_vec(value).expect("serialize"));
        remote
            .put(key, bytes, WritePrecondition::None)
            .await
            .expect("put");
    }

    fn synchronizer(remote: Arc<MemoryBackend>) -> (CacheSynchronizer, Arc<MemoryCacheStore>) {
        let cache = Arc::new(MemoryCacheStore::new());
        let sync = CacheSynchronizer::new(remote, cache.clone(), SyncConfig::default());
        (sync, cache)
    }

    #[tokio::test]
    async fn no_remote_manifest_is_a_noop() {
        let remote = Arc::new(MemoryBackend::new());
        let (sync, _cache) = synchronizer(remote);
        assert_eq!(sync.sync_cycle().await.expect("cycle"), CycleOutcome::NoOp);
    }

    #[tokio::test]
    async fn bootstrap_fetches_the_full_snapshot() {
        let remote = Arc::new(MemoryBackend::new());
        let catalog = vec![product("1", 100), product("2", 200)];
        put_json(&remote, "products.json", &catalog).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote);
        let outcome = sync.sync_cycle().await.expect("cycle");
        assert_eq!(
            outcome,
            CycleOutcome::Applied {
                version: Version::from_raw(10),
                diffs_applied: 0,
                bootstrapped: true,
            }
        );

        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot, catalog);
    }

    #[tokio::test]
    async fn repeated_cycles_are_noops() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote);
        sync.sync_cycle().await.expect("first cycle");
        assert_eq!(sync.sync_cycle().await.expect("second cycle"), CycleOutcome::NoOp);
    }

    #[tokio::test]
    async fn older_remote_manifest_is_never_applied() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote.clone());
        sync.sync_cycle().await.expect("cycle");

        // The remote regresses (e.g. a stale replica).
        put_json(&remote, "products.json", &vec![product("1", 999)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(9))).await;

        assert_eq!(sync.sync_cycle().await.expect("cycle"), CycleOutcome::NoOp);
        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot[0].price, 100, "cached state must be untouched");
    }

    #[tokio::test]
    async fn diffs_fold_onto_the_cached_snapshot_in_order() {
        let remote = Arc::new(MemoryBackend::new());
        let catalog: Vec<_> = (1..=5).map(|i| product(&i.to_string(), i64::from(i) * 100)).collect();
        put_json(&remote, "products.json", &catalog).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote.clone());
        sync.sync_cycle().await.expect("bootstrap");

        // Two diffs touching the same id; the later one must win.
        put_json(
            &remote,
            "diff/11.json",
            &vec![DiffEntry::Upsert(product("1", 150))],
        )
        .await;
        put_json(
            &remote,
            "diff/12.json",
            &vec![
                DiffEntry::Upsert(product("1", 175)),
                DiffEntry::Upsert(product("2", 250)),
            ],
        )
        .await;
        let manifest = Manifest::full(Version::from_raw(10))
            .with_diff(Version::from_raw(11), "diff/11.json")
            .with_diff(Version::from_raw(12), "diff/12.json");
        put_json(&remote, "manifest.json", &manifest).await;

        let outcome = sync.sync_cycle().await.expect("cycle");
        assert_eq!(
            outcome,
            CycleOutcome::Applied {
                version: Version::from_raw(12),
                diffs_applied: 2,
                bootstrapped: false,
            }
        );

        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot.len(), 5);
        let one = snapshot.iter().find(|r| r.id.as_str() == "1").expect("id 1");
        assert_eq!(one.price, 175);
    }

    /// Counts remote diff fetches so tests can assert only the chain tail is
    /// refetched.
    struct CountingBackend {
        inner: Arc<MemoryBackend>,
        diff_gets: AtomicUsize,
    }

    #[async_trait]
    impl StorageBackend for CountingBackend {
        async fn get(&self, key: &str) -> vitrine_core::Result<Bytes> {
            if key.starts_with("diff/") {
                self.diff_gets.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            data: Bytes,
            precondition: WritePrecondition,
        ) -> vitrine_core::Result<vitrine_core::WriteResult> {
            self.inner.put(key, data, precondition).await
        }

        async fn head(&self, key: &str) -> vitrine_core::Result<Option<ObjectMeta>> {
            self.inner.head(key).await
        }

        async fn list(&self, prefix: &str) -> vitrine_core::Result<Vec<ObjectMeta>> {
            self.inner.list(prefix).await
        }
    }

    #[tokio::test]
    async fn only_new_diffs_are_fetched() {
        let inner = Arc::new(MemoryBackend::new());
        put_json(&inner, "products.json", &vec![product("1", 100)]).await;
        put_json(&inner, "diff/11.json", &vec![DiffEntry::Upsert(product("1", 150))]).await;
        let v11 = Manifest::full(Version::from_raw(10)).with_diff(Version::from_raw(11), "diff/11.json");
        put_json(&inner, "manifest.json", &v11).await;

        let counting = Arc::new(CountingBackend {
            inner: inner.clone(),
            diff_gets: AtomicUsize::new(0),
        });
        let cache = Arc::new(MemoryCacheStore::new());
        let sync = CacheSynchronizer::new(counting.clone(), cache, SyncConfig::default());

        sync.sync_cycle().await.expect("first cycle");
        assert_eq!(counting.diff_gets.load(Ordering::SeqCst), 1);

        put_json(&inner, "diff/12.json", &vec![DiffEntry::Upsert(product("2", 200))]).await;
        put_json(
            &inner,
            "manifest.json",
            &v11.with_diff(Version::from_raw(12), "diff/12.json"),
        )
        .await;

        sync.sync_cycle().await.expect("second cycle");
        assert_eq!(
            counting.diff_gets.load(Ordering::SeqCst),
            2,
            "the already-folded diff must not be refetched"
        );
    }

    #[tokio::test]
    async fn full_rebuild_collapse_forces_a_bootstrap() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "diff/11.json", &vec![DiffEntry::Upsert(product("1", 150))]).await;
        put_json(
            &remote,
            "manifest.json",
            &Manifest::full(Version::from_raw(10)).with_diff(Version::from_raw(11), "diff/11.json"),
        )
        .await;

        let (sync, _cache) = synchronizer(remote.clone());
        sync.sync_cycle().await.expect("first cycle");

        // Builder collapses history: new full snapshot, empty chain.
        put_json(&remote, "products.json", &vec![product("1", 500), product("9", 900)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(20))).await;

        let outcome = sync.sync_cycle().await.expect("cycle");
        assert_eq!(
            outcome,
            CycleOutcome::Applied {
                version: Version::from_raw(20),
                diffs_applied: 0,
                bootstrapped: true,
            }
        );
        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn missing_diff_aborts_the_cycle_without_corrupting_state() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote.clone());
        sync.sync_cycle().await.expect("bootstrap");

        // Manifest references a diff that was never uploaded.
        put_json(
            &remote,
            "manifest.json",
            &Manifest::full(Version::from_raw(10)).with_diff(Version::from_raw(11), "diff/11.json"),
        )
        .await;

        let err = sync.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Storage { .. }));

        // Cached state still at version 10.
        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot[0].price, 100);

        // The diff shows up; the next cycle converges.
        put_json(&remote, "diff/11.json", &vec![DiffEntry::Upsert(product("1", 150))]).await;
        let outcome = sync.sync_cycle().await.expect("retry cycle");
        assert!(matches!(outcome, CycleOutcome::Applied { diffs_applied: 1, .. }));
    }

    #[tokio::test]
    async fn corrupt_diff_aborts_the_cycle() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote.clone());
        sync.sync_cycle().await.expect("bootstrap");

        remote
            .put(
                "diff/11.json",
                Bytes::from("{not json"),
                WritePrecondition::None,
            )
            .await
            .expect("put");
        put_json(
            &remote,
            "manifest.json",
            &Manifest::full(Version::from_raw(10)).with_diff(Version::from_raw(11), "diff/11.json"),
        )
        .await;

        let err = sync.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::CorruptArtifact { .. }));
        let snapshot = sync.cached_snapshot().await.expect("cached").expect("present");
        assert_eq!(snapshot[0].price, 100);
    }

    #[tokio::test]
    async fn update_broadcast_carries_the_new_version() {
        let remote = Arc::new(MemoryBackend::new());
        put_json(&remote, "products.json", &vec![product("1", 100)]).await;
        put_json(&remote, "manifest.json", &Manifest::full(Version::from_raw(10))).await;

        let (sync, _cache) = synchronizer(remote);
        let mut updates = sync.subscribe();

        sync.sync_cycle().await.expect("cycle");
        let event = updates.try_recv().expect("broadcast");
        assert_eq!(event.version, Version::from_raw(10));
    }

    /// A backend whose reads hang well past any fetch deadline.
    struct HangingBackend;

    #[async_trait]
    impl StorageBackend for HangingBackend {
        async fn get(&self, _key: &str) -> vitrine_core::Result<Bytes> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Err(vitrine_core::Error::storage("unreachable"))
        }

        async fn put(
            &self,
            _key: &str,
            _data: Bytes,
            _precondition: WritePrecondition,
        ) -> vitrine_core::Result<vitrine_core::WriteResult> {
            Err(vitrine_core::Error::storage("unreachable"))
        }

        async fn head(&self, _key: &str) -> vitrine_core::Result<Option<ObjectMeta>> {
            Ok(None)
        }

        async fn list(&self, _prefix: &str) -> vitrine_core::Result<Vec<ObjectMeta>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_surface_as_timeouts() {
        let cache = Arc::new(MemoryCacheStore::new());
        let sync = CacheSynchronizer::new(Arc::new(HangingBackend), cache, SyncConfig::default());

        let err = sync.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::NetworkTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_stops_on_shutdown_signal() {
        let remote = Arc::new(MemoryBackend::new());
        let (sync, _cache) = synchronizer(remote);
        let sync = Arc::new(sync);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sync.run(shutdown_rx));

        // Let the activation cycle run, then signal shutdown.
        tokio::task::yield_now().await;
        shutdown_tx.send(true).expect("send shutdown");
        handle.await.expect("task join");
    }
}
