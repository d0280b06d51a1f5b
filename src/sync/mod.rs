//! Sync engine entry points
//!
//! # Components
//!
//! - [`orchestrator`]: cache lookup, single-flight collection, persistence and stale fallback
//! - [`scheduler`]: periodic forced refresh of configured targets with jitter
//!
//! # Example
//!
//! ```ignore
//! use inventory_sync::models::ResourceKind;
//! use inventory_sync::sync::SyncOrchestrator;
//!
//! let orchestrator = SyncOrchestrator::from_config(&config, provider, store, catalog);
//! let response = orchestrator
//!     .request(ResourceKind::Instance, "123456789012", None, false)
//!     .await?;
//! if response.is_degraded() {
//!     eprintln!("failed regions: {:?}", response.failed_regions());
//! }
//! ```

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{SyncOrchestrator, SyncResponse};
pub use scheduler::{
    ManualRefreshHandle, RefreshScheduler, RefreshStatus, RefreshSummary, Refresher, StatusHandle,
};
