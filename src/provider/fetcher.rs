//! Single-region fetch with timeout and retry

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::retry::RetryPolicy;
use super::traits::ResourceProvider;
use crate::error::ProviderError;
use crate::models::{ResourceKind, ResourceRecord};

/// Fetches one (account, kind, region) slice from a provider
///
/// Each attempt is bounded by `timeout`; an expired attempt counts as a
/// transient [`ProviderError::Timeout`] and is retried by the policy.
pub struct RemoteFetcher {
    provider: Arc<dyn ResourceProvider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RemoteFetcher {
    /// Create a new fetcher
    pub fn new(provider: Arc<dyn ResourceProvider>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            timeout,
        }
    }

    /// Underlying provider
    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Fetch every record of `kind` in one region
    ///
    /// Every record's `region` is set to the region it was fetched from,
    /// whatever the provider reported.
    #[instrument(skip(self), fields(provider = %self.provider.name()))]
    pub async fn fetch(
        &self,
        kind: ResourceKind,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let timeout = self.timeout;
        let timeout_ms = timeout.as_millis() as u64;

        let mut records = self
            .policy
            .execute(|| async move {
                match tokio::time::timeout(
                    timeout,
                    self.provider.list_resources(kind, account_id, region),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(timeout_ms)),
                }
            })
            .await?;

        for record in records.iter_mut() {
            if record.region != region {
                if !record.region.is_empty() {
                    warn!(
                        resource_id = %record.resource_id,
                        reported = %record.region,
                        "Provider reported a different region, overriding"
                    );
                }
                record.region = region.to_string();
            }
        }

        debug!(records = records.len(), "Region fetch complete");
        Ok(records)
    }
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}
