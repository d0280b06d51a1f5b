//! Sync history and per-region status models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceKind;
use crate::error::{ErrorClass, ProviderError};

/// Result of fetching one region during a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionStatus {
    /// Region answered; `records` were merged into the payload
    Ok {
        /// Number of records contributed by this region
        records: usize,
    },
    /// Region failed and contributed nothing
    Error {
        /// Transient or permanent
        class: ErrorClass,
        /// Provider error message
        message: String,
    },
}

impl RegionStatus {
    /// Status for a region that failed with the given provider error
    pub fn from_error(err: &ProviderError) -> Self {
        RegionStatus::Error {
            class: err.class(),
            message: err.to_string(),
        }
    }

    /// True if the region answered
    pub fn is_ok(&self) -> bool {
        matches!(self, RegionStatus::Ok { .. })
    }
}

/// Overall outcome of one collect-and-store cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every region answered
    Success,
    /// At least one region answered and at least one failed
    Partial,
    /// No region answered
    Failed,
}

impl SyncOutcome {
    /// Derive the outcome from a per-region status map
    ///
    /// An empty map is a failure: nothing was collected.
    pub fn from_statuses(statuses: &BTreeMap<String, RegionStatus>) -> Self {
        let ok = statuses.values().filter(|s| s.is_ok()).count();
        if ok == 0 {
            SyncOutcome::Failed
        } else if ok == statuses.len() {
            SyncOutcome::Success
        } else {
            SyncOutcome::Partial
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Success => write!(f, "success"),
            SyncOutcome::Partial => write!(f, "partial"),
            SyncOutcome::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncOutcome::Success),
            "partial" => Ok(SyncOutcome::Partial),
            "failed" => Ok(SyncOutcome::Failed),
            _ => Err(format!("Invalid sync outcome: {}", s)),
        }
    }
}

/// Append-only audit record of one collect-and-store cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    /// Database ID (set after insertion)
    pub id: Option<i64>,

    /// Account the cycle ran for
    pub account_id: String,

    /// Resource kind collected
    pub kind: ResourceKind,

    /// Region selector of the scope (None = all regions)
    pub region: Option<String>,

    /// When collection started
    pub started_at: DateTime<Utc>,

    /// When the cycle finished
    pub completed_at: DateTime<Utc>,

    /// Overall outcome
    pub status: SyncOutcome,

    /// Records merged across all regions
    pub records_fetched: u64,

    /// Failed regions and persistence errors, if any
    pub error_detail: Option<String>,
}

impl SyncHistoryEntry {
    /// Create a history entry for a finished cycle
    pub fn new(
        account_id: impl Into<String>,
        kind: ResourceKind,
        region: Option<String>,
        started_at: DateTime<Utc>,
        status: SyncOutcome,
        records_fetched: u64,
    ) -> Self {
        Self {
            id: None,
            account_id: account_id.into(),
            kind,
            region,
            started_at,
            completed_at: Utc::now(),
            status,
            records_fetched,
            error_detail: None,
        }
    }

    /// Attach an error detail
    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    /// Cycle duration
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Summarize failed regions as `region: message; region: message`
pub fn describe_region_failures(statuses: &BTreeMap<String, RegionStatus>) -> Option<String> {
    let failures: Vec<String> = statuses
        .iter()
        .filter_map(|(region, status)| match status {
            RegionStatus::Error { message, .. } => Some(format!("{}: {}", region, message)),
            RegionStatus::Ok { .. } => None,
        })
        .collect();

    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}
