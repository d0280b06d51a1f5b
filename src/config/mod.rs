//! Configuration management for inventory-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::ResourceKind;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Cache and fan-out settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Regions to poll
    #[serde(default)]
    pub regions: RegionConfig,

    /// Inventory provider connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Periodic refresh configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix INVENTORY_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(ttl) = std::env::var("INVENTORY_SYNC_CACHE_TTL_SECS") {
            config.sync.cache_ttl_secs = ttl
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid cache TTL".to_string()))?;
        }
        if let Ok(concurrency) = std::env::var("INVENTORY_SYNC_MAX_CONCURRENCY") {
            config.sync.max_concurrency = concurrency
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid max concurrency".to_string()))?;
        }
        if let Ok(regions) = std::env::var("INVENTORY_SYNC_REGIONS") {
            config.regions.regions = regions
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(endpoint) = std::env::var("INVENTORY_SYNC_PROVIDER_ENDPOINT") {
            config.provider.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("INVENTORY_SYNC_PROVIDER_TOKEN") {
            config.provider.api_token = Some(token);
        }

        if let Ok(path) = std::env::var("INVENTORY_SYNC_DATABASE_PATH") {
            config.database.path = path;
        }

        if let Ok(enabled) = std::env::var("INVENTORY_SYNC_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("INVENTORY_SYNC_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let Ok(level) = std::env::var("INVENTORY_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        for target in &self.scheduler.targets {
            if target.interval_secs == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "scheduler target {} has a zero interval",
                    target.name()
                )));
            }
        }
        Ok(())
    }
}

/// Cache and fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Freshness window for cached snapshots in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum concurrent region fetches per collection
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-attempt provider call timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl SyncConfig {
    /// Cache TTL as a Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Per-attempt timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_max_concurrency() -> usize {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

/// Retry configuration for provider calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per region, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Region catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    /// Regions to poll when a request does not name one
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// Regions polled first
    #[serde(default = "default_priority_regions")]
    pub priority: Vec<String>,

    /// Ask the provider for its region list at startup
    #[serde(default)]
    pub discover: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            priority: default_priority_regions(),
            discover: false,
        }
    }
}

fn default_regions() -> Vec<String> {
    crate::provider::regions::DEFAULT_REGIONS
        .iter()
        .map(|r| r.to_string())
        .collect()
}

fn default_priority_regions() -> Vec<String> {
    crate::provider::regions::PRIORITY_REGIONS
        .iter()
        .map(|r| r.to_string())
        .collect()
}

/// Inventory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Base URL of the inventory gateway
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// HTTP client timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Bearer token for the gateway
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            timeout_secs: default_provider_timeout(),
            api_token: None,
        }
    }
}

fn default_provider_endpoint() -> String {
    "http://127.0.0.1:8600".to_string()
}

fn default_provider_timeout() -> u64 {
    60
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "/data/db/inventory-sync.db".to_string()
}

/// Periodic refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    /// Initial delay before the first refresh (seconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Jitter range (seconds) added to refresh intervals
    #[serde(default = "default_scheduler_jitter")]
    pub jitter_secs: u64,

    /// Timeout for one refresh (seconds)
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,

    /// What to refresh
    #[serde(default)]
    pub targets: Vec<RefreshTargetConfig>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            jitter_secs: default_scheduler_jitter(),
            sync_timeout_secs: default_sync_timeout(),
            targets: Vec::new(),
        }
    }
}

fn default_initial_delay() -> u64 {
    5
}

fn default_scheduler_jitter() -> u64 {
    30
}

fn default_sync_timeout() -> u64 {
    600
}

/// One periodically refreshed (account, kind, region) target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTargetConfig {
    /// Account to refresh
    pub account_id: String,

    /// Resource kind to refresh
    pub kind: ResourceKind,

    /// Single region, or every catalog region when absent
    #[serde(default)]
    pub region: Option<String>,

    /// Refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl RefreshTargetConfig {
    /// Target name used by manual refresh and status lookups
    pub fn name(&self) -> String {
        format!(
            "{}:{}:{}",
            self.account_id,
            self.kind,
            self.region.as_deref().unwrap_or("*")
        )
    }
}

fn default_refresh_interval() -> u64 {
    900 // 15 minutes
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "inventory-sync".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
