//! Persistent inventory store
//!
//! This module defines the store trait and its SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ResourceKind, ResourceRecord, Scope, SyncHistoryEntry};

/// Durable per-kind inventory tables and the sync history log
///
/// Rows are keyed by `(account_id, resource_id, region)` within a kind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // =========================================================================
    // Inventory operations
    // =========================================================================

    /// Insert or replace `records` for `account_id` in one transaction
    ///
    /// `created_at` is kept from the first insert of a row; `last_synced_at`
    /// is set on every upsert. Returns the number of rows written.
    async fn upsert(
        &self,
        kind: ResourceKind,
        account_id: &str,
        records: &[ResourceRecord],
    ) -> Result<usize, StoreError>;

    /// Latest known records for the scope, regardless of age
    async fn read(&self, kind: ResourceKind, scope: &Scope)
        -> Result<Vec<ResourceRecord>, StoreError>;

    /// Most recent `last_synced_at` among the scope's rows
    async fn last_synced_at(
        &self,
        kind: ResourceKind,
        scope: &Scope,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Number of stored rows of `kind` for `account_id`
    async fn count(&self, kind: ResourceKind, account_id: &str) -> Result<u64, StoreError>;

    // =========================================================================
    // Sync history operations
    // =========================================================================

    /// Append a history entry, returning its ID
    async fn append_history(&self, entry: &SyncHistoryEntry) -> Result<i64, StoreError>;

    /// Most recent history entries, newest first, optionally for one account
    async fn list_history(
        &self,
        account_id: Option<String>,
        limit: usize,
    ) -> Result<Vec<SyncHistoryEntry>, StoreError>;
}
