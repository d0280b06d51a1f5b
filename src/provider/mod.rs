//! Cloud inventory provider access
//!
//! # Components
//!
//! - [`traits`]: The [`ResourceProvider`] seam every provider implements
//! - [`http`]: Provider backed by a JSON inventory gateway
//! - [`retry`]: Exponential backoff policy for transient failures
//! - [`fetcher`]: One region fetch with per-attempt timeout and retry
//! - [`regions`]: Ordered region catalog with discovery fallback

pub mod fetcher;
pub mod http;
pub mod regions;
pub mod retry;
pub mod traits;

// Re-export main types for convenience
pub use fetcher::RemoteFetcher;
pub use http::HttpInventoryProvider;
pub use regions::RegionCatalog;
pub use retry::RetryPolicy;
pub use traits::ResourceProvider;

#[cfg(test)]
pub use traits::MockResourceProvider;
