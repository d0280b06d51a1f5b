//! SQLite implementation of the InventoryStore trait
//!
//! Uses rusqlite behind tokio-rusqlite's background connection thread.
//! Tags and attributes are stored as JSON text; timestamps as RFC 3339 with
//! microsecond precision so they sort lexically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;

use super::migrations::CREATE_SCHEMA;
use super::InventoryStore;
use crate::error::StoreError;
use crate::models::{ResourceKind, ResourceRecord, Scope, SyncHistoryEntry};

/// SQLite inventory store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and create if needed) a SQLite store
    ///
    /// Use `:memory:` for an in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;

        // Run migrations
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }
}

/// One record flattened into column values
struct RecordRow {
    resource_id: String,
    region: String,
    name: Option<String>,
    state: Option<String>,
    tags: String,
    attributes: String,
    observed_at: String,
}

impl RecordRow {
    fn from_record(record: &ResourceRecord) -> Result<Self, StoreError> {
        Ok(Self {
            resource_id: record.resource_id.clone(),
            region: record.region.clone(),
            name: record.name.clone(),
            state: record.state.clone(),
            tags: serde_json::to_string(&record.tags)?,
            attributes: serde_json::to_string(&record.attributes)?,
            observed_at: format_datetime(record.observed_at),
        })
    }
}

/// Column values as read back, decoded outside the connection thread
struct StoredRow {
    resource_id: String,
    region: String,
    name: Option<String>,
    state: Option<String>,
    tags: String,
    attributes: String,
    observed_at: Option<String>,
}

impl StoredRow {
    fn into_record(self) -> Result<ResourceRecord, StoreError> {
        let observed_at = parse_datetime(self.observed_at).ok_or_else(|| {
            StoreError::Corrupt(format!("observed_at of {}", self.resource_id))
        })?;

        Ok(ResourceRecord {
            resource_id: self.resource_id,
            region: self.region,
            name: self.name,
            state: self.state,
            tags: serde_json::from_str(&self.tags)?,
            attributes: serde_json::from_str(&self.attributes)?,
            observed_at,
        })
    }
}

struct HistoryRow {
    id: i64,
    account_id: String,
    kind: String,
    region: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    status: String,
    records_fetched: i64,
    error_detail: Option<String>,
}

impl HistoryRow {
    fn into_entry(self) -> Result<SyncHistoryEntry, StoreError> {
        let id = self.id;
        let corrupt = |field: &str| StoreError::Corrupt(format!("{} of history entry {}", field, id));

        Ok(SyncHistoryEntry {
            id: Some(id),
            account_id: self.account_id,
            kind: self.kind.parse().map_err(|_| corrupt("kind"))?,
            region: self.region,
            started_at: parse_datetime(self.started_at).ok_or_else(|| corrupt("started_at"))?,
            completed_at: parse_datetime(self.completed_at)
                .ok_or_else(|| corrupt("completed_at"))?,
            status: self.status.parse().map_err(|_| corrupt("status"))?,
            records_fetched: self.records_fetched.max(0) as u64,
            error_detail: self.error_detail,
        })
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    // =========================================================================
    // Inventory operations
    // =========================================================================

    async fn upsert(
        &self,
        kind: ResourceKind,
        account_id: &str,
        records: &[ResourceRecord],
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = records
            .iter()
            .map(RecordRow::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        let account_id = account_id.to_string();
        let now = format_datetime(Utc::now());
        let sql = format!(
            r#"
            INSERT INTO {}
            (account_id, resource_id, region, name, state, tags, attributes, observed_at,
             created_at, last_synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(account_id, resource_id, region) DO UPDATE SET
                name = excluded.name,
                state = excluded.state,
                tags = excluded.tags,
                attributes = excluded.attributes,
                observed_at = excluded.observed_at,
                last_synced_at = excluded.last_synced_at
            "#,
            kind.table_name()
        );

        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut written = 0usize;
                {
                    let mut stmt = tx.prepare(&sql)?;
                    for row in &rows {
                        written += stmt.execute(rusqlite::params![
                            account_id,
                            row.resource_id,
                            row.region,
                            row.name,
                            row.state,
                            row.tags,
                            row.attributes,
                            row.observed_at,
                            now,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;

        debug!(kind = %kind, rows = written, "Upserted inventory batch");
        Ok(written)
    }

    async fn read(
        &self,
        kind: ResourceKind,
        scope: &Scope,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        let account_id = scope.account_id.clone();
        let region = scope.region.clone();
        let sql = format!(
            r#"
            SELECT resource_id, region, name, state, tags, attributes, observed_at
            FROM {}
            WHERE account_id = ?1 AND (?2 IS NULL OR region = ?2)
            ORDER BY region, resource_id
            "#,
            kind.table_name()
        );

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![account_id, region], |row| {
                        Ok(StoredRow {
                            resource_id: row.get(0)?,
                            region: row.get(1)?,
                            name: row.get(2)?,
                            state: row.get(3)?,
                            tags: row.get(4)?,
                            attributes: row.get(5)?,
                            observed_at: row.get(6)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }

    async fn last_synced_at(
        &self,
        kind: ResourceKind,
        scope: &Scope,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let account_id = scope.account_id.clone();
        let region = scope.region.clone();
        let sql = format!(
            "SELECT MAX(last_synced_at) FROM {} WHERE account_id = ?1 AND (?2 IS NULL OR region = ?2)",
            kind.table_name()
        );

        let latest: Option<String> = self
            .conn
            .call(move |conn| {
                let latest = conn.query_row(&sql, rusqlite::params![account_id, region], |row| {
                    row.get(0)
                })?;
                Ok(latest)
            })
            .await?;

        Ok(parse_datetime(latest))
    }

    async fn count(&self, kind: ResourceKind, account_id: &str) -> Result<u64, StoreError> {
        let account_id = account_id.to_string();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE account_id = ?1",
            kind.table_name()
        );

        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(&sql, [&account_id], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Sync history operations
    // =========================================================================

    async fn append_history(&self, entry: &SyncHistoryEntry) -> Result<i64, StoreError> {
        let account_id = entry.account_id.clone();
        let kind = entry.kind.to_string();
        let region = entry.region.clone();
        let started_at = format_datetime(entry.started_at);
        let completed_at = format_datetime(entry.completed_at);
        let status = entry.status.to_string();
        let records_fetched = entry.records_fetched as i64;
        let error_detail = entry.error_detail.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO sync_history
                    (account_id, kind, region, started_at, completed_at, status,
                     records_fetched, error_detail)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    rusqlite::params![
                        account_id,
                        kind,
                        region,
                        started_at,
                        completed_at,
                        status,
                        records_fetched,
                        error_detail
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    async fn list_history(
        &self,
        account_id: Option<String>,
        limit: usize,
    ) -> Result<Vec<SyncHistoryEntry>, StoreError> {
        let limit = limit.min(i64::MAX as usize) as i64;

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, account_id, kind, region, started_at, completed_at, status,
                           records_fetched, error_detail
                    FROM sync_history
                    WHERE ?1 IS NULL OR account_id = ?1
                    ORDER BY started_at DESC, id DESC
                    LIMIT ?2
                    "#,
                )?;

                let rows = stmt
                    .query_map(rusqlite::params![account_id, limit], |row| {
                        Ok(HistoryRow {
                            id: row.get(0)?,
                            account_id: row.get(1)?,
                            kind: row.get(2)?,
                            region: row.get(3)?,
                            started_at: row.get(4)?,
                            completed_at: row.get(5)?,
                            status: row.get(6)?,
                            records_fetched: row.get(7)?,
                            error_detail: row.get(8)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse datetime string from SQLite
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // Try parsing SQLite's datetime format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
