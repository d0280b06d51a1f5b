//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use inventory_sync::config::{Config, RetryConfig};
use inventory_sync::error::ProviderError;
use inventory_sync::models::{ResourceKind, ResourceRecord};
use inventory_sync::provider::{RegionCatalog, ResourceProvider};
use inventory_sync::store::{InventoryStore, SqliteStore};
use inventory_sync::sync::SyncOrchestrator;

pub const ACCOUNT: &str = "123456789012";

/// Provider that answers from a per-region script and counts calls
pub struct ScriptedProvider {
    regions: Vec<String>,
    script: Mutex<HashMap<String, Result<Vec<ResourceRecord>, ProviderError>>>,
    calls: AtomicUsize,
    calls_by_region: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl ScriptedProvider {
    /// Every region answers with two records
    pub fn new(regions: &[&str]) -> Self {
        let script = regions
            .iter()
            .map(|r| (r.to_string(), Ok(records_for(r))))
            .collect();

        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            calls_by_region: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    /// Delay every listing call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace one region's answer
    pub fn set_region(&self, region: &str, result: Result<Vec<ResourceRecord>, ProviderError>) {
        self.script
            .lock()
            .unwrap()
            .insert(region.to_string(), result);
    }

    /// Make every region fail with `err`
    pub fn fail_all(&self, err: ProviderError) {
        let mut script = self.script.lock().unwrap();
        for result in script.values_mut() {
            *result = Err(err.clone());
        }
    }

    /// Total listing calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Listing calls made against `region`
    pub fn calls_for(&self, region: &str) -> usize {
        self.calls_by_region
            .lock()
            .unwrap()
            .get(region)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_resources(
        &self,
        _kind: ResourceKind,
        _account_id: &str,
        region: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_region
            .lock()
            .unwrap()
            .entry(region.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let answer = self.script.lock().unwrap().get(region).cloned();
        answer.unwrap_or_else(|| Err(ProviderError::InvalidScope(region.to_string())))
    }

    async fn list_regions(&self, _account_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.regions.clone())
    }
}

/// Two deterministic records for a region
pub fn records_for(region: &str) -> Vec<ResourceRecord> {
    (1..=2)
        .map(|i| {
            ResourceRecord::new(format!("i-{}-{}", region, i), region)
                .with_name(format!("web-{}", i))
                .with_state("running")
                .with_tag("env", "test")
        })
        .collect()
}

/// Configuration with fast retries
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Create an in-memory store for testing
pub async fn create_test_store() -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::in_memory()
            .await
            .expect("Failed to create test store"),
    )
}

/// Wire an orchestrator over the scripted provider and store
pub fn create_test_orchestrator(
    provider: Arc<ScriptedProvider>,
    store: Arc<SqliteStore>,
    regions: &[&str],
) -> SyncOrchestrator {
    let provider: Arc<dyn ResourceProvider> = provider;
    let store: Arc<dyn InventoryStore> = store;
    SyncOrchestrator::from_config(
        &test_config(),
        provider,
        store,
        RegionCatalog::new(regions, &[]),
    )
}
