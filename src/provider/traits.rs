//! Resource provider trait definition

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{ResourceKind, ResourceRecord};

/// Source of cloud inventory for one account and region at a time
///
/// Implementations perform a single call per invocation; retries and
/// timeouts are layered on by [`super::RemoteFetcher`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// List every resource of `kind` in `region` for `account_id`
    async fn list_resources(
        &self,
        kind: ResourceKind,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError>;

    /// List the regions enabled for `account_id`
    async fn list_regions(&self, account_id: &str) -> Result<Vec<String>, ProviderError>;
}
