//! In-memory freshness cache
//!
//! Snapshots are keyed by a typed `(scope, kind)` key in a sharded
//! [`DashMap`], so lookups and stores on distinct keys never contend on a
//! global lock. Entries expire lazily: an entry older than the TTL is
//! reported as a miss but stays in the map until it is overwritten or
//! invalidated.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{RegionStatus, ResourceKind, ResourceRecord, Scope};

/// Default freshness window
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache key: which account/region selector and which kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Account plus region selector
    pub scope: Scope,
    /// Resource kind
    pub kind: ResourceKind,
}

impl CacheKey {
    /// Create a new key
    pub fn new(scope: Scope, kind: ResourceKind) -> Self {
        Self { scope, kind }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}

/// A cached snapshot
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Merged records of the collection that produced this entry
    pub payload: Arc<Vec<ResourceRecord>>,

    /// Per-region status of that collection
    pub region_status: BTreeMap<String, RegionStatus>,

    /// Monotonic store time; freshness is judged against this
    pub fetched_at: Instant,

    /// Wall-clock store time, for reporting
    pub fetched_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    /// Time since the entry was stored
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// True while `age < ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held, fresh or expired
    pub entries: u64,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups with no entry or an expired one
    pub misses: u64,
    /// Misses caused by an expired entry
    pub expired: u64,
}

impl CacheStats {
    /// Calculates the hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Process-wide freshness cache with a single TTL
#[derive(Debug)]
pub struct FreshnessCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl FreshnessCache {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the entry for `(scope, kind)` if it is still fresh
    pub fn lookup(&self, scope: &Scope, kind: ResourceKind) -> Option<CacheEntry> {
        let key = CacheKey::new(scope.clone(), kind);

        match self.entries.get(&key) {
            Some(entry) if entry.is_fresh(self.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, age_ms = entry.age().as_millis() as u64, "Cache hit");
                Some(entry.value().clone())
            }
            Some(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.expired.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, age_ms = entry.age().as_millis() as u64, "Cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Fresh entry for `(scope, kind)` without touching the statistics
    pub fn peek(&self, scope: &Scope, kind: ResourceKind) -> Option<CacheEntry> {
        self.entries
            .get(&CacheKey::new(scope.clone(), kind))
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value().clone())
    }

    /// Store a snapshot, replacing any previous entry for the key
    pub fn store(
        &self,
        scope: &Scope,
        kind: ResourceKind,
        payload: Arc<Vec<ResourceRecord>>,
        region_status: BTreeMap<String, RegionStatus>,
    ) -> CacheEntry {
        let key = CacheKey::new(scope.clone(), kind);
        let entry = CacheEntry {
            payload,
            region_status,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        };

        debug!(key = %key, records = entry.payload.len(), "Cache store");
        self.entries.insert(key, entry.clone());
        entry
    }

    /// Remove entries whose account starts with `account_prefix`, or every
    /// entry when no prefix is given. Returns the number removed.
    pub fn invalidate(&self, account_prefix: Option<&str>) -> usize {
        let before = self.entries.len();

        match account_prefix {
            Some(prefix) => self
                .entries
                .retain(|key, _| !key.scope.account_id.starts_with(prefix)),
            None => self.entries.clear(),
        }

        let removed = before.saturating_sub(self.entries.len());
        info!(
            prefix = account_prefix.unwrap_or("*"),
            removed, "Cache invalidated"
        );
        removed
    }

    /// Entries currently held, fresh or expired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Usage statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl Default for FreshnessCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(ids: &[&str]) -> Arc<Vec<ResourceRecord>> {
        Arc::new(
            ids.iter()
                .map(|id| ResourceRecord::new(*id, "us-east-1"))
                .collect(),
        )
    }

    // Test 1: Miss on an empty cache, hit after store
    #[tokio::test]
    async fn test_lookup_miss_then_hit() {
        let cache = FreshnessCache::default();
        let scope = Scope::all_regions("acct");

        assert!(cache.lookup(&scope, ResourceKind::Instance).is_none());

        let data = payload(&["i-1", "i-2"]);
        cache.store(&scope, ResourceKind::Instance, data.clone(), BTreeMap::new());

        let entry = cache.lookup(&scope, ResourceKind::Instance).unwrap();
        assert!(Arc::ptr_eq(&entry.payload, &data));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 50.0).abs() < f64::EPSILON);
    }

    // Test 2: Keys are distinct per kind and per region selector
    #[tokio::test]
    async fn test_keys_are_typed() {
        let cache = FreshnessCache::default();
        let all = Scope::all_regions("acct");
        let one = Scope::region("acct", "us-east-1");

        cache.store(&all, ResourceKind::Instance, payload(&["i-1"]), BTreeMap::new());

        assert!(cache.lookup(&all, ResourceKind::Snapshot).is_none());
        assert!(cache.lookup(&one, ResourceKind::Instance).is_none());
        assert!(cache.lookup(&all, ResourceKind::Instance).is_some());
    }

    // Test 3: Entries expire lazily at the TTL boundary
    #[tokio::test]
    async fn test_lazy_expiry() {
        tokio::time::pause();
        let cache = FreshnessCache::new(Duration::from_secs(300));
        let scope = Scope::all_regions("acct");

        cache.store(&scope, ResourceKind::Alarm, payload(&["a-1"]), BTreeMap::new());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.lookup(&scope, ResourceKind::Alarm).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.lookup(&scope, ResourceKind::Alarm).is_none());

        // Not evicted
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired, 1);
    }

    // Test 4: Store overwrites and refreshes the timestamp
    #[tokio::test]
    async fn test_store_overwrites() {
        tokio::time::pause();
        let cache = FreshnessCache::new(Duration::from_secs(10));
        let scope = Scope::all_regions("acct");

        cache.store(&scope, ResourceKind::Image, payload(&["old"]), BTreeMap::new());
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.store(&scope, ResourceKind::Image, payload(&["new"]), BTreeMap::new());
        tokio::time::advance(Duration::from_secs(8)).await;

        let entry = cache.lookup(&scope, ResourceKind::Image).unwrap();
        assert_eq!(entry.payload[0].resource_id, "new");
        assert_eq!(cache.len(), 1);
    }

    // Test 5: Invalidate by account prefix
    #[tokio::test]
    async fn test_invalidate_by_prefix() {
        let cache = FreshnessCache::default();
        for account in ["1111-prod", "1111-dev", "2222-prod"] {
            cache.store(
                &Scope::all_regions(account),
                ResourceKind::Instance,
                payload(&["i-1"]),
                BTreeMap::new(),
            );
        }
        cache.store(
            &Scope::region("1111-prod", "eu-west-1"),
            ResourceKind::Snapshot,
            payload(&["s-1"]),
            BTreeMap::new(),
        );

        assert_eq!(cache.invalidate(Some("1111")), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache
            .lookup(&Scope::all_regions("2222-prod"), ResourceKind::Instance)
            .is_some());
    }

    // Test 6: Invalidate everything
    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = FreshnessCache::default();
        cache.store(&Scope::all_regions("a"), ResourceKind::Alarm, payload(&[]), BTreeMap::new());
        cache.store(&Scope::all_regions("b"), ResourceKind::Alarm, payload(&[]), BTreeMap::new());

        assert_eq!(cache.invalidate(None), 2);
        assert!(cache.is_empty());
    }

    // Test 7: Region status is kept with the entry
    #[tokio::test]
    async fn test_region_status_retained() {
        let cache = FreshnessCache::default();
        let scope = Scope::all_regions("acct");
        let mut status = BTreeMap::new();
        status.insert("us-east-1".to_string(), RegionStatus::Ok { records: 1 });

        cache.store(&scope, ResourceKind::CostRecord, payload(&["c-1"]), status.clone());

        let entry = cache.lookup(&scope, ResourceKind::CostRecord).unwrap();
        assert_eq!(entry.region_status, status);
    }

    // Test 8: Concurrent stores on distinct keys all land
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_keys() {
        let cache = Arc::new(FreshnessCache::default());
        let mut handles = Vec::new();

        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let scope = Scope::all_regions(format!("acct-{}", i));
                cache.store(&scope, ResourceKind::Instance, payload(&["i-1"]), BTreeMap::new());
                cache.lookup(&scope, ResourceKind::Instance).is_some()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(cache.len(), 32);
    }

    // Test 9: Peek sees fresh entries without counting hits or misses
    #[tokio::test]
    async fn test_peek_leaves_stats_alone() {
        tokio::time::pause();
        let cache = FreshnessCache::new(Duration::from_secs(60));
        let scope = Scope::all_regions("acct");

        assert!(cache.peek(&scope, ResourceKind::Image).is_none());

        let data = payload(&["ami-1"]);
        cache.store(&scope, ResourceKind::Image, data.clone(), BTreeMap::new());
        let entry = cache.peek(&scope, ResourceKind::Image).unwrap();
        assert!(Arc::ptr_eq(&entry.payload, &data));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.peek(&scope, ResourceKind::Image).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.expired, 0);
    }
}
