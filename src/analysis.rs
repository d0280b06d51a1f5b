//! Read-side analyses over persisted snapshots
//!
//! These read the durable store only; they never trigger a collection.
//! Records are interpreted through their gateway attributes:
//!
//! - snapshots: `volumeId`, `volumeSize` (GiB), `startTime` (RFC 3339)
//! - instances: `launchTime` (RFC 3339), with `state == "stopped"`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{ResourceKind, ResourceRecord, Scope};
use crate::store::InventoryStore;

/// Snapshots at or above this volume size (GiB) count as big
pub const DEFAULT_BIG_VOLUME_GB: u64 = 100;

/// Approximate snapshot storage price used for cost estimates
pub const SNAPSHOT_USD_PER_GB_MONTH: f64 = 0.05;

/// Counts of resources by age, each resource in exactly one bucket
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeBuckets {
    /// At least 30 and under 60 days old
    pub days_30: u64,
    /// At least 60 and under 90 days old
    pub days_60: u64,
    /// 90 days old or more
    pub days_90: u64,
}

impl AgeBuckets {
    fn add(&mut self, age_days: i64) {
        if age_days >= 90 {
            self.days_90 += 1;
        } else if age_days >= 60 {
            self.days_60 += 1;
        } else if age_days >= 30 {
            self.days_30 += 1;
        }
    }
}

/// Dashboard figures for a set of snapshots
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotAnalysis {
    pub total: usize,
    /// Snapshot count per source volume; `Unknown` for snapshots without one
    pub by_volume: BTreeMap<String, usize>,
    /// Distinct known volumes that have at least one snapshot
    pub volumes_with_snapshots: usize,
    pub age: AgeBuckets,
    /// Snapshots whose volume is at least [`DEFAULT_BIG_VOLUME_GB`]
    pub big_volume: usize,
}

/// A snapshot of a large volume with its estimated monthly storage cost
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BigVolumeSnapshot {
    pub snapshot_id: String,
    pub volume_id: Option<String>,
    pub volume_size_gb: u64,
    pub region: String,
    pub state: Option<String>,
    pub estimated_monthly_cost: f64,
}

fn attr_str<'a>(record: &'a ResourceRecord, key: &str) -> Option<&'a str> {
    record.attributes.get(key).and_then(|v| v.as_str())
}

fn attr_time(record: &ResourceRecord, key: &str) -> Option<DateTime<Utc>> {
    attr_str(record, key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Volume size in GiB; missing or non-numeric sizes read as zero
fn volume_size_gb(record: &ResourceRecord) -> u64 {
    match record.attributes.get("volumeSize") {
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        None => 0,
    }
}

/// Summarise snapshots by volume, age and size
///
/// Snapshots without a parseable `startTime` are counted but not aged.
pub fn analyze_snapshots(snapshots: &[ResourceRecord], now: DateTime<Utc>) -> SnapshotAnalysis {
    let mut analysis = SnapshotAnalysis {
        total: snapshots.len(),
        ..SnapshotAnalysis::default()
    };

    for snapshot in snapshots {
        let volume = attr_str(snapshot, "volumeId").unwrap_or("Unknown");
        *analysis.by_volume.entry(volume.to_string()).or_insert(0) += 1;

        if let Some(started) = attr_time(snapshot, "startTime") {
            analysis.age.add((now - started).num_days());
        }
        if volume_size_gb(snapshot) >= DEFAULT_BIG_VOLUME_GB {
            analysis.big_volume += 1;
        }
    }

    analysis.volumes_with_snapshots = analysis
        .by_volume
        .keys()
        .filter(|v| v.as_str() != "Unknown")
        .count();
    analysis
}

/// Snapshots of volumes at least `threshold_gb` large, largest first
pub fn big_volume_snapshots(
    snapshots: &[ResourceRecord],
    threshold_gb: u64,
) -> Vec<BigVolumeSnapshot> {
    let mut big: Vec<BigVolumeSnapshot> = snapshots
        .iter()
        .filter_map(|s| {
            let size = volume_size_gb(s);
            (size >= threshold_gb).then(|| BigVolumeSnapshot {
                snapshot_id: s.resource_id.clone(),
                volume_id: attr_str(s, "volumeId").map(String::from),
                volume_size_gb: size,
                region: s.region.clone(),
                state: s.state.clone(),
                estimated_monthly_cost: (size as f64 * SNAPSHOT_USD_PER_GB_MONTH * 100.0).round()
                    / 100.0,
            })
        })
        .collect();

    big.sort_by(|a, b| b.volume_size_gb.cmp(&a.volume_size_gb));
    big
}

/// Stopped instances bucketed by days since launch
///
/// The gateway does not report when an instance stopped, so launch time
/// stands in for it.
pub fn stopped_instances_by_duration(
    instances: &[ResourceRecord],
    now: DateTime<Utc>,
) -> AgeBuckets {
    let mut buckets = AgeBuckets::default();
    for instance in instances
        .iter()
        .filter(|i| i.state.as_deref() == Some("stopped"))
    {
        if let Some(launched) = attr_time(instance, "launchTime") {
            buckets.add((now - launched).num_days());
        }
    }
    buckets
}

/// Resource counts per region, for any kind
pub fn count_by_region(records: &[ResourceRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.region.clone()).or_insert(0) += 1;
    }
    counts
}

/// Snapshot analysis over the persisted snapshot for `scope`
pub async fn snapshot_analysis(
    store: &dyn InventoryStore,
    scope: &Scope,
) -> Result<SnapshotAnalysis, StoreError> {
    let snapshots = store.read(ResourceKind::Snapshot, scope).await?;
    Ok(analyze_snapshots(&snapshots, Utc::now()))
}

/// Persisted big-volume snapshots for `scope`, largest first
pub async fn persisted_big_volume_snapshots(
    store: &dyn InventoryStore,
    scope: &Scope,
    threshold_gb: u64,
) -> Result<Vec<BigVolumeSnapshot>, StoreError> {
    let snapshots = store.read(ResourceKind::Snapshot, scope).await?;
    Ok(big_volume_snapshots(&snapshots, threshold_gb))
}

/// Persisted stopped instances for `scope`, bucketed by duration
pub async fn stopped_instances(
    store: &dyn InventoryStore,
    scope: &Scope,
) -> Result<AgeBuckets, StoreError> {
    let instances = store.read(ResourceKind::Instance, scope).await?;
    Ok(stopped_instances_by_duration(&instances, Utc::now()))
}
