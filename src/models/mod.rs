//! Domain models for inventory-sync
//!
//! This module contains the core domain models used throughout the engine.

pub mod history;
pub mod resource;

// Re-export commonly used types
pub use history::{RegionStatus, SyncHistoryEntry, SyncOutcome};
pub use resource::{ResourceKind, ResourceRecord, Scope};
