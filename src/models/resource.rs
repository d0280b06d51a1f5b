//! Resource-related domain models
//!
//! This module defines resource kinds, scopes, and the inventory record
//! shared by the provider, cache, and store layers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of cloud inventory object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance
    Instance,
    /// Disk snapshot
    Snapshot,
    /// Machine image
    Image,
    /// Monitoring alarm
    Alarm,
    /// Billing cost record
    CostRecord,
}

impl ResourceKind {
    /// All resource kinds, in a stable order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Instance,
        ResourceKind::Snapshot,
        ResourceKind::Image,
        ResourceKind::Alarm,
        ResourceKind::CostRecord,
    ];

    /// Stable identifier used in URLs, config files and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Image => "image",
            ResourceKind::Alarm => "alarm",
            ResourceKind::CostRecord => "cost_record",
        }
    }

    /// Name of the persistent table holding this kind
    pub fn table_name(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instances",
            ResourceKind::Snapshot => "snapshots",
            ResourceKind::Image => "images",
            ResourceKind::Alarm => "alarms",
            ResourceKind::CostRecord => "cost_records",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "instance" | "instances" => Ok(ResourceKind::Instance),
            "snapshot" | "snapshots" => Ok(ResourceKind::Snapshot),
            "image" | "images" => Ok(ResourceKind::Image),
            "alarm" | "alarms" => Ok(ResourceKind::Alarm),
            "cost_record" | "cost_records" | "cost" => Ok(ResourceKind::CostRecord),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// Account plus region selector
///
/// `region = None` means every region in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Opaque account identifier
    pub account_id: String,

    /// Single region, or all catalog regions when absent
    pub region: Option<String>,
}

impl Scope {
    /// Scope covering every catalog region
    pub fn all_regions(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: None,
        }
    }

    /// Scope restricted to one region
    pub fn region(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: Some(region.into()),
        }
    }

    /// Build a scope from an optional region
    pub fn new(account_id: impl Into<String>, region: Option<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.account_id,
            self.region.as_deref().unwrap_or("*")
        )
    }
}

/// One inventory object as reported by the provider
///
/// `(account_id, resource_id, region)` is unique per kind; the account is
/// carried by the scope the record was fetched under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Stable provider identifier (instance ID, snapshot ID, alarm name...)
    pub resource_id: String,

    /// Region the record was fetched from
    #[serde(default)]
    pub region: String,

    /// Display name, usually from a Name tag
    #[serde(default)]
    pub name: Option<String>,

    /// Lifecycle state (running, stopped, completed, ALARM...)
    #[serde(default)]
    pub state: Option<String>,

    /// Resource tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Kind-specific attributes
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,

    /// When the provider reported this record
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Create a new record
    pub fn new(resource_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            region: region.into(),
            name: None,
            state: None,
            tags: BTreeMap::new(),
            attributes: serde_json::Map::new(),
            observed_at: Utc::now(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the lifecycle state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a kind-specific attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set the observation time
    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}
