//! Region catalog
//!
//! The ordered, de-duplicated list of regions a collection fans out over
//! when a request does not name a single region.

use tracing::{info, warn};

use super::traits::ResourceProvider;
use crate::config::RegionConfig;

/// Regions polled first when present
pub const PRIORITY_REGIONS: &[&str] = &["us-east-1", "us-west-2", "eu-west-1", "ap-southeast-1"];

/// Regions used when none are configured and discovery is off or fails
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
];

/// Ordered list of regions to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCatalog {
    regions: Vec<String>,
}

impl RegionCatalog {
    /// Build a catalog from `regions`, moving `priority` regions to the front
    ///
    /// Priority regions only reorder; a priority region missing from
    /// `regions` is not added. Duplicates and blank names are dropped.
    pub fn new<S: AsRef<str>>(regions: &[S], priority: &[S]) -> Self {
        let mut ordered: Vec<String> = Vec::with_capacity(regions.len());

        let present = |name: &str| regions.iter().any(|r| r.as_ref().trim() == name);

        for p in priority {
            let p = p.as_ref().trim();
            if !p.is_empty() && present(p) && !ordered.iter().any(|r| r == p) {
                ordered.push(p.to_string());
            }
        }
        for r in regions {
            let r = r.as_ref().trim();
            if !r.is_empty() && !ordered.iter().any(|o| o == r) {
                ordered.push(r.to_string());
            }
        }

        Self { regions: ordered }
    }

    /// Catalog from configuration only
    pub fn from_config(config: &RegionConfig) -> Self {
        Self::new(&config.regions, &config.priority)
    }

    /// Ask the provider for the account's regions, falling back to configuration
    ///
    /// An error or an empty answer from the provider yields
    /// [`RegionCatalog::from_config`].
    pub async fn discover(
        provider: &dyn ResourceProvider,
        account_id: &str,
        config: &RegionConfig,
    ) -> Self {
        match provider.list_regions(account_id).await {
            Ok(regions) if !regions.is_empty() => {
                let catalog = Self::new(&regions, &config.priority);
                info!(
                    account_id = account_id,
                    regions = catalog.len(),
                    "Discovered regions from provider"
                );
                catalog
            }
            Ok(_) => {
                warn!(account_id = account_id, "Provider returned no regions, using configured list");
                Self::from_config(config)
            }
            Err(e) => {
                warn!(
                    account_id = account_id,
                    error = %e,
                    "Region discovery failed, using configured list"
                );
                Self::from_config(config)
            }
        }
    }

    /// Regions in polling order
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Regions a request fans out over: the named one, or the whole catalog
    pub fn resolve(&self, region: Option<&str>) -> Vec<String> {
        match region {
            Some(r) => vec![r.to_string()],
            None => self.regions.clone(),
        }
    }

    /// True if `region` is in the catalog
    pub fn contains(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True if the catalog has no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_REGIONS, PRIORITY_REGIONS)
    }
}
