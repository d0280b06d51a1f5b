//! Database migrations for inventory-sync
//!
//! One table per resource kind, all with the same shape, plus the sync
//! history log.

/// SQL statement to create the database schema
pub const CREATE_SCHEMA: &str = r#"
-- Compute instances
CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT,
    state TEXT,
    tags TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    observed_at DATETIME,
    created_at DATETIME NOT NULL,
    last_synced_at DATETIME NOT NULL,
    UNIQUE(account_id, resource_id, region)
);

CREATE INDEX IF NOT EXISTS idx_instances_account_region ON instances(account_id, region);

-- Disk snapshots
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT,
    state TEXT,
    tags TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    observed_at DATETIME,
    created_at DATETIME NOT NULL,
    last_synced_at DATETIME NOT NULL,
    UNIQUE(account_id, resource_id, region)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_account_region ON snapshots(account_id, region);

-- Machine images
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT,
    state TEXT,
    tags TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    observed_at DATETIME,
    created_at DATETIME NOT NULL,
    last_synced_at DATETIME NOT NULL,
    UNIQUE(account_id, resource_id, region)
);

CREATE INDEX IF NOT EXISTS idx_images_account_region ON images(account_id, region);

-- Monitoring alarms
CREATE TABLE IF NOT EXISTS alarms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT,
    state TEXT,
    tags TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    observed_at DATETIME,
    created_at DATETIME NOT NULL,
    last_synced_at DATETIME NOT NULL,
    UNIQUE(account_id, resource_id, region)
);

CREATE INDEX IF NOT EXISTS idx_alarms_account_region ON alarms(account_id, region);

-- Billing cost records
CREATE TABLE IF NOT EXISTS cost_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT,
    state TEXT,
    tags TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    observed_at DATETIME,
    created_at DATETIME NOT NULL,
    last_synced_at DATETIME NOT NULL,
    UNIQUE(account_id, resource_id, region)
);

CREATE INDEX IF NOT EXISTS idx_cost_records_account_region ON cost_records(account_id, region);

-- Collect-and-store cycle log
CREATE TABLE IF NOT EXISTS sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    region TEXT,
    started_at DATETIME NOT NULL,
    completed_at DATETIME NOT NULL,
    status TEXT NOT NULL,
    records_fetched INTEGER NOT NULL DEFAULT 0,
    error_detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_history_account ON sync_history(account_id, started_at DESC);
"#;

/// Get the migration version
pub fn migration_version() -> i32 {
    1
}
