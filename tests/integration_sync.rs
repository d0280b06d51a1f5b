//! Sync engine integration tests
//!
//! Exercises the orchestrator end to end over a scripted provider and an
//! in-memory SQLite store:
//! - Cache hits and forced refreshes
//! - Partial failure and stale fallback
//! - Single-flight collection
//! - Persistence and history

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{create_test_orchestrator, create_test_store, records_for, ScriptedProvider, ACCOUNT};
use inventory_sync::cache::FreshnessCache;
use inventory_sync::collector::ParallelCollector;
use inventory_sync::error::{ErrorClass, ProviderError, SyncError};
use inventory_sync::models::{RegionStatus, ResourceKind, Scope, SyncOutcome};
use inventory_sync::provider::{RegionCatalog, RemoteFetcher, ResourceProvider, RetryPolicy};
use inventory_sync::store::InventoryStore;
use inventory_sync::sync::SyncOrchestrator;

const REGIONS: [&str; 3] = ["us-east-1", "us-west-2", "eu-west-1"];

#[tokio::test]
async fn test_cold_start_populates_cache_and_store() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store.clone(), &REGIONS);

    let response = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();

    assert_eq!(response.outcome, SyncOutcome::Success);
    assert!(!response.from_cache);
    assert!(!response.stale);
    assert_eq!(response.records.len(), 6);
    assert_eq!(provider.calls(), 3);

    assert_eq!(orchestrator.cache().len(), 1);
    assert_eq!(store.count(ResourceKind::Instance, ACCOUNT).await.unwrap(), 6);

    let history = store.list_history(Some(ACCOUNT.to_string()), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncOutcome::Success);
    assert_eq!(history[0].records_fetched, 6);
    assert!(history[0].error_detail.is_none());
}

#[tokio::test]
async fn test_cache_hit_makes_no_remote_calls() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &REGIONS);

    let first = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    let calls_after_first = provider.calls();

    let second = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();

    assert_eq!(provider.calls(), calls_after_first);
    assert!(second.from_cache);
    assert!(Arc::ptr_eq(&first.records, &second.records));
    assert_eq!(
        serde_json::to_vec(&*first.records).unwrap(),
        serde_json::to_vec(&*second.records).unwrap()
    );
    assert_eq!(second.fetched_at, first.fetched_at);
    assert_eq!(orchestrator.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_force_refresh_always_collects() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &REGIONS);

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    let refreshed = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, true)
        .await
        .unwrap();

    assert_eq!(provider.calls(), 6);
    assert!(!refreshed.from_cache);

    // The forced result replaces the cached one
    let cached = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&refreshed.records, &cached.records));
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_repeated_refresh_is_idempotent_in_store() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider, store.clone(), &REGIONS);

    for _ in 0..3 {
        orchestrator
            .request(ResourceKind::Snapshot, ACCOUNT, None, true)
            .await
            .unwrap();
    }

    assert_eq!(store.count(ResourceKind::Snapshot, ACCOUNT).await.unwrap(), 6);
    assert_eq!(store.count(ResourceKind::Instance, ACCOUNT).await.unwrap(), 0);
    assert_eq!(
        store.list_history(Some(ACCOUNT.to_string()), 10).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_partial_failure_reports_failed_region() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    provider.set_region(
        "us-west-2",
        Err(ProviderError::AccessDenied("not authorized".to_string())),
    );
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store.clone(), &REGIONS);

    let response = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();

    assert_eq!(response.outcome, SyncOutcome::Partial);
    assert!(response.is_degraded());
    assert!(!response.stale);
    assert_eq!(response.failed_regions(), vec!["us-west-2"]);
    assert_eq!(response.records.len(), 4);
    assert!(response.records.iter().all(|r| r.region != "us-west-2"));
    assert!(matches!(
        response.region_status.get("us-west-2"),
        Some(RegionStatus::Error { class: ErrorClass::Permanent, .. })
    ));

    // Permanent errors are not retried
    assert_eq!(provider.calls_for("us-west-2"), 1);

    let history = store.list_history(Some(ACCOUNT.to_string()), 1).await.unwrap();
    assert_eq!(history[0].status, SyncOutcome::Partial);
    assert!(history[0]
        .error_detail
        .as_deref()
        .is_some_and(|d| d.contains("us-west-2")));

    // Successful regions are persisted
    assert_eq!(store.count(ResourceKind::Instance, ACCOUNT).await.unwrap(), 4);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    provider.set_region("eu-west-1", Err(ProviderError::ServerError(503)));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &REGIONS);

    let response = orchestrator
        .request(ResourceKind::Alarm, ACCOUNT, None, false)
        .await
        .unwrap();

    assert_eq!(response.outcome, SyncOutcome::Partial);
    assert_eq!(provider.calls_for("eu-west-1"), 3);
    assert_eq!(provider.calls_for("us-east-1"), 1);
    assert!(matches!(
        response.region_status.get("eu-west-1"),
        Some(RegionStatus::Error { class: ErrorClass::Transient, .. })
    ));
}

#[tokio::test]
async fn test_single_flight_collects_once() {
    let provider = Arc::new(
        ScriptedProvider::new(&["us-east-1"]).with_delay(Duration::from_millis(200)),
    );
    let store = create_test_store().await;
    let orchestrator = Arc::new(create_test_orchestrator(
        provider.clone(),
        store.clone(),
        &["us-east-1"],
    ));

    let a = {
        let o = orchestrator.clone();
        tokio::spawn(async move { o.request(ResourceKind::Image, ACCOUNT, None, false).await })
    };
    let b = {
        let o = orchestrator.clone();
        tokio::spawn(async move { o.request(ResourceKind::Image, ACCOUNT, None, false).await })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    assert_eq!(provider.calls(), 1);
    assert!(Arc::ptr_eq(&a.records, &b.records));
    assert_eq!(orchestrator.in_flight(), 0);
    assert_eq!(
        store.list_history(Some(ACCOUNT.to_string()), 10).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_forced_refresh_joins_in_flight_collection() {
    let provider = Arc::new(
        ScriptedProvider::new(&["us-east-1"]).with_delay(Duration::from_millis(200)),
    );
    let store = create_test_store().await;
    let orchestrator = Arc::new(create_test_orchestrator(
        provider.clone(),
        store.clone(),
        &["us-east-1"],
    ));

    let plain = {
        let o = orchestrator.clone();
        tokio::spawn(async move { o.request(ResourceKind::Alarm, ACCOUNT, None, false).await })
    };

    // Let the first collection start before forcing
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orchestrator.in_flight(), 1);

    let forced = {
        let o = orchestrator.clone();
        tokio::spawn(async move { o.request(ResourceKind::Alarm, ACCOUNT, None, true).await })
    };

    let (plain, forced) = (plain.await.unwrap().unwrap(), forced.await.unwrap().unwrap());

    assert_eq!(provider.calls(), 1);
    assert!(!forced.from_cache);
    assert!(Arc::ptr_eq(&plain.records, &forced.records));
    assert_eq!(orchestrator.in_flight(), 0);
    assert_eq!(
        store.list_history(Some(ACCOUNT.to_string()), 10).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_distinct_scopes_collect_separately() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &REGIONS);

    let all = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    let one = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, Some("eu-west-1"), false)
        .await
        .unwrap();

    assert_eq!(all.records.len(), 6);
    assert_eq!(one.records.len(), 2);
    assert_eq!(one.scope, Scope::region(ACCOUNT, "eu-west-1"));
    assert!(!one.from_cache);
    assert_eq!(provider.calls(), 4);
    assert_eq!(orchestrator.cache().len(), 2);
}

#[tokio::test]
async fn test_stale_fallback_serves_persisted_snapshot() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store.clone(), &REGIONS);

    let fresh = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    let synced_at = store
        .last_synced_at(ResourceKind::Instance, &Scope::all_regions(ACCOUNT))
        .await
        .unwrap()
        .unwrap();

    provider.fail_all(ProviderError::Network("connection refused".to_string()));

    let stale = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, true)
        .await
        .unwrap();

    assert!(stale.stale);
    assert!(stale.is_degraded());
    assert_eq!(stale.outcome, SyncOutcome::Failed);
    assert_eq!(stale.fetched_at, synced_at);
    assert_eq!(stale.failed_regions().len(), 3);

    let mut expected: Vec<_> = fresh.records.iter().map(|r| r.resource_id.clone()).collect();
    let mut actual: Vec<_> = stale.records.iter().map(|r| r.resource_id.clone()).collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);

    let history = store.list_history(Some(ACCOUNT.to_string()), 1).await.unwrap();
    assert_eq!(history[0].status, SyncOutcome::Failed);
    assert_eq!(history[0].records_fetched, 0);
}

#[tokio::test]
async fn test_failed_collection_is_not_cached() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &REGIONS);

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    provider.fail_all(ProviderError::Timeout(30_000));
    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, true)
        .await
        .unwrap();

    // The earlier successful entry still answers
    let cached = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    assert!(cached.from_cache);
    assert!(!cached.stale);
    assert_eq!(cached.outcome, SyncOutcome::Success);
}

#[tokio::test]
async fn test_no_data_available_on_cold_failure() {
    let provider = Arc::new(ScriptedProvider::new(&REGIONS));
    provider.fail_all(ProviderError::AccessDenied("expired token".to_string()));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider, store.clone(), &REGIONS);

    let result = orchestrator
        .request(ResourceKind::CostRecord, ACCOUNT, Some("us-east-1"), false)
        .await;

    assert_eq!(
        result,
        Err(SyncError::NoDataAvailable {
            kind: ResourceKind::CostRecord,
            account_id: ACCOUNT.to_string(),
            region: Some("us-east-1".to_string()),
        })
    );
    assert!(orchestrator.cache().is_empty());

    let history = store.list_history(None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncOutcome::Failed);
}

#[tokio::test]
async fn test_invalidate_forces_next_collection() {
    let provider = Arc::new(ScriptedProvider::new(&["us-east-1"]));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store, &["us-east-1"]);

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    orchestrator
        .request(ResourceKind::Instance, "999999999999", None, false)
        .await
        .unwrap();
    assert_eq!(provider.calls(), 2);

    assert_eq!(orchestrator.invalidate_cache(Some("1234")), 1);
    assert_eq!(orchestrator.cache().len(), 1);

    let response = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    assert!(!response.from_cache);
    assert_eq!(provider.calls(), 3);

    assert_eq!(orchestrator.invalidate_cache(None), 2);
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn test_expired_entry_triggers_collection() {
    let provider = Arc::new(ScriptedProvider::new(&["us-east-1"]));
    let store = create_test_store().await;

    let dyn_provider: Arc<dyn ResourceProvider> = provider.clone();
    let dyn_store: Arc<dyn InventoryStore> = store;
    let fetcher = RemoteFetcher::new(dyn_provider, RetryPolicy::no_retry(), Duration::from_secs(5));
    let orchestrator = SyncOrchestrator::new(
        ParallelCollector::new(Arc::new(fetcher), 2),
        RegionCatalog::new(&["us-east-1"], &[]),
        Arc::new(FreshnessCache::new(Duration::from_millis(150))),
        dyn_store,
    );

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    let hit = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    assert!(hit.from_cache);
    assert_eq!(provider.calls(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let miss = orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();
    assert!(!miss.from_cache);
    assert_eq!(provider.calls(), 2);
    assert_eq!(orchestrator.cache().stats().expired, 1);
}

#[tokio::test]
async fn test_changed_records_replace_persisted_rows() {
    let provider = Arc::new(ScriptedProvider::new(&["us-east-1"]));
    let store = create_test_store().await;
    let orchestrator = create_test_orchestrator(provider.clone(), store.clone(), &["us-east-1"]);

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, false)
        .await
        .unwrap();

    let mut updated = records_for("us-east-1");
    updated[0].state = Some("stopped".to_string());
    provider.set_region("us-east-1", Ok(updated));

    orchestrator
        .request(ResourceKind::Instance, ACCOUNT, None, true)
        .await
        .unwrap();

    let rows = store
        .read(ResourceKind::Instance, &Scope::region(ACCOUNT, "us-east-1"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let first = rows
        .iter()
        .find(|r| r.resource_id == "i-us-east-1-1")
        .unwrap();
    assert_eq!(first.state.as_deref(), Some("stopped"));
}
