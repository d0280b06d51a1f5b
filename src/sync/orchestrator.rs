//! Request entry point: cache lookup, single-flight collection, persistence,
//! and stale fallback
//!
//! ```text
//! CACHE_LOOKUP -> HIT ------------------------------------------> RESPOND
//!              -> MISS | force -> COLLECT -> PERSIST -> CACHE_STORE -> RESPOND
//!                                    \-> (every region failed) -> STORE_READ -> RESPOND stale
//!                                                                        \-> NoDataAvailable
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheEntry, CacheKey, FreshnessCache};
use crate::collector::{CollectionResult, ParallelCollector};
use crate::config::Config;
use crate::error::SyncError;
use crate::models::history::describe_region_failures;
use crate::models::{
    RegionStatus, ResourceKind, ResourceRecord, Scope, SyncHistoryEntry, SyncOutcome,
};
use crate::otel::SyncMetrics;
use crate::provider::{RegionCatalog, RemoteFetcher, ResourceProvider, RetryPolicy};
use crate::store::InventoryStore;

type SharedResult = Result<SyncResponse, SyncError>;

enum Flight {
    Cached(CacheEntry),
    Join(Arc<OnceCell<SharedResult>>),
}

/// Answer to a `request`
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    /// Resource kind requested
    pub kind: ResourceKind,

    /// Account and region selector requested
    pub scope: Scope,

    /// Records, shared with the cache entry they came from
    pub records: Arc<Vec<ResourceRecord>>,

    /// Per-region status of the collection that produced `records`
    pub region_status: BTreeMap<String, RegionStatus>,

    /// Outcome of that collection
    pub outcome: SyncOutcome,

    /// True when `records` is the persisted snapshot served after a failed
    /// collection
    pub stale: bool,

    /// True when answered from the freshness cache without remote calls
    pub from_cache: bool,

    /// When `records` were collected
    pub fetched_at: DateTime<Utc>,
}

impl SyncResponse {
    fn from_cache_entry(kind: ResourceKind, scope: Scope, entry: CacheEntry) -> Self {
        let outcome = SyncOutcome::from_statuses(&entry.region_status);
        Self {
            kind,
            scope,
            records: entry.payload,
            region_status: entry.region_status,
            outcome,
            stale: false,
            from_cache: true,
            fetched_at: entry.fetched_at_utc,
        }
    }

    /// True if the data is stale or some region failed
    pub fn is_degraded(&self) -> bool {
        self.stale || self.outcome != SyncOutcome::Success
    }

    /// Regions whose fetch failed
    pub fn failed_regions(&self) -> Vec<&str> {
        self.region_status
            .iter()
            .filter(|(_, s)| !s.is_ok())
            .map(|(r, _)| r.as_str())
            .collect()
    }
}

/// The engine's public entry point
pub struct SyncOrchestrator {
    collector: ParallelCollector,
    catalog: RegionCatalog,
    cache: Arc<FreshnessCache>,
    store: Arc<dyn InventoryStore>,
    in_flight: Mutex<HashMap<CacheKey, Arc<OnceCell<SharedResult>>>>,
    metrics: Option<SyncMetrics>,
}

impl SyncOrchestrator {
    /// Create an orchestrator from its parts
    pub fn new(
        collector: ParallelCollector,
        catalog: RegionCatalog,
        cache: Arc<FreshnessCache>,
        store: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            collector,
            catalog,
            cache,
            store,
            in_flight: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Wire provider, store and catalog together using configured limits
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn ResourceProvider>,
        store: Arc<dyn InventoryStore>,
        catalog: RegionCatalog,
    ) -> Self {
        let fetcher = RemoteFetcher::new(
            provider,
            RetryPolicy::new(config.retry.clone()),
            config.sync.fetch_timeout(),
        );
        let collector = ParallelCollector::new(Arc::new(fetcher), config.sync.max_concurrency);
        let cache = Arc::new(FreshnessCache::new(config.sync.cache_ttl()));

        Self::new(collector, catalog, cache, store)
    }

    /// Attach metric instruments
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Region catalog used when a request names no region
    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Freshness cache
    pub fn cache(&self) -> &Arc<FreshnessCache> {
        &self.cache
    }

    /// Persistent store
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Return resources of `kind` for the account, optionally one region
    ///
    /// A fresh cache entry answers immediately unless `force_refresh` is
    /// set. Otherwise a collection runs; concurrent requests for the same
    /// `(scope, kind)` share one in-flight collection and its result.
    /// Only [`SyncError::NoDataAvailable`] is returned as an error; region
    /// failures are reported in the response.
    #[instrument(skip(self))]
    pub async fn request(
        &self,
        kind: ResourceKind,
        account_id: &str,
        region: Option<&str>,
        force_refresh: bool,
    ) -> Result<SyncResponse, SyncError> {
        let scope = Scope::new(account_id, region.map(String::from));

        if !force_refresh {
            if let Some(entry) = self.cache.lookup(&scope, kind) {
                if let Some(ref m) = self.metrics {
                    m.record_cache_hit(kind);
                }
                return Ok(SyncResponse::from_cache_entry(kind, scope, entry));
            }
            if let Some(ref m) = self.metrics {
                m.record_cache_miss(kind);
            }
        }

        let key = CacheKey::new(scope.clone(), kind);
        let cell = match self.join_flight(&key, force_refresh) {
            Flight::Cached(entry) => {
                return Ok(SyncResponse::from_cache_entry(kind, scope, entry));
            }
            Flight::Join(cell) => cell,
        };

        let result = cell
            .get_or_init(|| self.collect_and_store(kind, scope))
            .await
            .clone();

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(&key);
            }
        }

        result
    }

    /// Join the in-flight collection for `key`, or register a new one
    ///
    /// A leader stores into the cache before leaving the map, so a
    /// non-forced caller finding no flight rechecks the cache here under
    /// the lock instead of starting a second collection.
    fn join_flight(&self, key: &CacheKey, force_refresh: bool) -> Flight {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(cell) = in_flight.get(key) {
            return Flight::Join(cell.clone());
        }

        if !force_refresh {
            if let Some(entry) = self.cache.peek(&key.scope, key.kind) {
                debug!(key = %key, "Collection finished while waiting, using cache");
                return Flight::Cached(entry);
            }
        }

        let cell = Arc::new(OnceCell::new());
        in_flight.insert(key.clone(), cell.clone());
        Flight::Join(cell)
    }

    /// Drop cache entries for accounts starting with `account_prefix`, or all
    pub fn invalidate_cache(&self, account_prefix: Option<&str>) -> usize {
        self.cache.invalidate(account_prefix)
    }

    /// Number of collections currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn collect_and_store(&self, kind: ResourceKind, scope: Scope) -> SharedResult {
        let started_at = Utc::now();
        let timer = Instant::now();

        let regions = self.catalog.resolve(scope.region.as_deref());
        debug!(scope = %scope, regions = regions.len(), "Starting collection");

        let collection = self
            .collector
            .collect(kind, &scope.account_id, &regions)
            .await;
        let outcome = collection.outcome();

        if let Some(ref m) = self.metrics {
            m.record_collection(
                kind,
                outcome,
                collection.failed_regions().len(),
                timer.elapsed().as_secs_f64(),
            );
        }

        if outcome == SyncOutcome::Failed {
            let detail = describe_region_failures(&collection.region_status);
            self.record_history(&scope, kind, started_at, outcome, 0, detail)
                .await;
            return self.fallback(kind, scope, collection).await;
        }

        let CollectionResult {
            records,
            region_status,
        } = collection;
        let records = Arc::new(records);
        let mut detail = describe_region_failures(&region_status);

        match self.store.upsert(kind, &scope.account_id, &records).await {
            Ok(rows) => debug!(rows, "Persisted collection"),
            Err(e) => {
                error!(scope = %scope, error = %e, "Failed to persist collection");
                let persist = format!("persist: {}", e);
                detail = Some(match detail {
                    Some(d) => format!("{}; {}", d, persist),
                    None => persist,
                });
            }
        }

        self.record_history(
            &scope,
            kind,
            started_at,
            outcome,
            records.len() as u64,
            detail,
        )
        .await;

        let entry = self
            .cache
            .store(&scope, kind, records.clone(), region_status.clone());

        info!(
            scope = %scope,
            records = records.len(),
            outcome = %outcome,
            "Collection stored"
        );

        Ok(SyncResponse {
            kind,
            scope,
            records,
            region_status,
            outcome,
            stale: false,
            from_cache: false,
            fetched_at: entry.fetched_at_utc,
        })
    }

    async fn fallback(
        &self,
        kind: ResourceKind,
        scope: Scope,
        collection: CollectionResult,
    ) -> SharedResult {
        let records = match self.store.read(kind, &scope).await {
            Ok(records) => records,
            Err(e) => {
                error!(scope = %scope, error = %e, "Failed to read persisted snapshot");
                Vec::new()
            }
        };

        if records.is_empty() {
            warn!(scope = %scope, "Collection failed and no persisted snapshot exists");
            return Err(SyncError::NoDataAvailable {
                kind,
                account_id: scope.account_id,
                region: scope.region,
            });
        }

        let fetched_at = match self.store.last_synced_at(kind, &scope).await {
            Ok(Some(at)) => at,
            Ok(None) => Utc::now(),
            Err(e) => {
                warn!(error = %e, "Could not read snapshot age");
                Utc::now()
            }
        };

        if let Some(ref m) = self.metrics {
            m.record_stale_fallback(kind);
        }
        warn!(
            scope = %scope,
            records = records.len(),
            last_synced_at = %fetched_at,
            "Collection failed, serving persisted snapshot"
        );

        Ok(SyncResponse {
            kind,
            scope,
            records: Arc::new(records),
            region_status: collection.region_status,
            outcome: SyncOutcome::Failed,
            stale: true,
            from_cache: false,
            fetched_at,
        })
    }

    async fn record_history(
        &self,
        scope: &Scope,
        kind: ResourceKind,
        started_at: DateTime<Utc>,
        outcome: SyncOutcome,
        records_fetched: u64,
        detail: Option<String>,
    ) {
        let mut entry = SyncHistoryEntry::new(
            scope.account_id.clone(),
            kind,
            scope.region.clone(),
            started_at,
            outcome,
            records_fetched,
        );
        entry.error_detail = detail;

        if let Err(e) = self.store.append_history(&entry).await {
            error!(scope = %scope, error = %e, "Failed to append sync history");
        }
    }
}
