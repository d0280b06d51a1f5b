//! Bounded-concurrency fan-out of region fetches
//!
//! One fetch task per region, at most `max_concurrency` in flight. A failed
//! region contributes an error status and no records; it never cancels its
//! siblings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{ErrorClass, ProviderError};
use crate::models::{RegionStatus, ResourceKind, ResourceRecord, SyncOutcome};
use crate::provider::RemoteFetcher;

/// Merged output of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResult {
    /// Records from every region that answered, grouped by region in
    /// request order
    pub records: Vec<ResourceRecord>,

    /// Status of every requested region
    pub region_status: BTreeMap<String, RegionStatus>,
}

impl CollectionResult {
    /// Overall outcome of the collection
    pub fn outcome(&self) -> SyncOutcome {
        SyncOutcome::from_statuses(&self.region_status)
    }

    /// True if no region answered
    pub fn is_total_failure(&self) -> bool {
        self.outcome() == SyncOutcome::Failed
    }

    /// Regions that failed
    pub fn failed_regions(&self) -> Vec<&str> {
        self.region_status
            .iter()
            .filter(|(_, s)| !s.is_ok())
            .map(|(r, _)| r.as_str())
            .collect()
    }
}

/// Fans a fetch out across regions with bounded concurrency
#[derive(Debug, Clone)]
pub struct ParallelCollector {
    fetcher: Arc<RemoteFetcher>,
    max_concurrency: usize,
}

impl ParallelCollector {
    /// Create a collector; a zero cap is raised to one
    pub fn new(fetcher: Arc<RemoteFetcher>, max_concurrency: usize) -> Self {
        Self {
            fetcher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Concurrency cap
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Fetch `kind` for `account_id` from every region in `regions`
    pub async fn collect(
        &self,
        kind: ResourceKind,
        account_id: &str,
        regions: &[String],
    ) -> CollectionResult {
        let mut ordered: Vec<String> = Vec::with_capacity(regions.len());
        for region in regions {
            if !ordered.contains(region) {
                ordered.push(region.clone());
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for region in ordered.iter().cloned() {
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();
            let account_id = account_id.to_string();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetcher.fetch(kind, &account_id, &region).await,
                    Err(_) => Err(ProviderError::Network("collector shut down".to_string())),
                };
                (region, result)
            });
        }

        let mut fetched: HashMap<String, Vec<ResourceRecord>> = HashMap::new();
        let mut region_status = BTreeMap::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((region, Ok(records))) => {
                    region_status.insert(
                        region.clone(),
                        RegionStatus::Ok {
                            records: records.len(),
                        },
                    );
                    fetched.insert(region, records);
                }
                Ok((region, Err(e))) => {
                    warn!(
                        account_id = account_id,
                        kind = %kind,
                        region = %region,
                        class = %e.class(),
                        error = %e,
                        "Region fetch failed"
                    );
                    region_status.insert(region, RegionStatus::from_error(&e));
                }
                Err(e) => {
                    warn!(error = %e, "Region fetch task aborted");
                }
            }
        }

        // A task that panicked never reported its region
        for region in &ordered {
            region_status
                .entry(region.clone())
                .or_insert_with(|| RegionStatus::Error {
                    class: ErrorClass::Transient,
                    message: "fetch task aborted".to_string(),
                });
        }

        let mut records = Vec::new();
        for region in &ordered {
            if let Some(mut batch) = fetched.remove(region) {
                records.append(&mut batch);
            }
        }

        let result = CollectionResult {
            records,
            region_status,
        };

        info!(
            account_id = account_id,
            kind = %kind,
            regions = ordered.len(),
            failed = result.failed_regions().len(),
            records = result.records.len(),
            outcome = %result.outcome(),
            "Collection complete"
        );

        result
    }
}
