//! Error types for inventory-sync
//!
//! This module defines the error taxonomy used throughout the engine.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::models::ResourceKind;

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Throttling, timeouts, connection resets, 5xx
    Transient,
    /// Authorization denial, malformed scope, bad payloads
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors raised by a single resource-listing call against one region
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Request throttled by the provider
    #[error("Throttled by provider: {0}")]
    Throttled(String),

    /// Attempt exceeded its per-call timeout
    #[error("Provider call timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the provider
    #[error("Provider error: HTTP {0}")]
    ServerError(u16),

    /// Credentials lack permission for this account or region
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Account, region or kind not accepted by the provider
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Response could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ProviderError {
    /// Classify this error as transient or permanent
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Throttled(_) => ErrorClass::Transient,
            ProviderError::Timeout(_) => ErrorClass::Transient,
            ProviderError::Network(_) => ErrorClass::Transient,
            ProviderError::ServerError(code) if *code >= 500 => ErrorClass::Transient,
            ProviderError::ServerError(_) => ErrorClass::Permanent,
            ProviderError::AccessDenied(_) => ErrorClass::Permanent,
            ProviderError::InvalidScope(_) => ErrorClass::Permanent,
            ProviderError::InvalidData(_) => ErrorClass::Permanent,
        }
    }
}

/// Persistent store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Background connection error
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Record attributes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted
    #[error("Invalid stored value: {0}")]
    Corrupt(String),
}

/// Errors surfaced to callers of the sync orchestrator
///
/// Per-region failures never appear here; they are reported in the
/// response's region status map. Only a request that has nothing to
/// return fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// No cached entry, no persisted snapshot, and every region failed
    #[error("No data available for {kind} in account {account_id} ({})", .region.as_deref().unwrap_or("all regions"))]
    NoDataAvailable {
        kind: ResourceKind,
        account_id: String,
        region: Option<String>,
    },

    /// The refresh target is unknown to the scheduler
    #[error("Unknown refresh target: {0}")]
    UnknownTarget(String),

    /// The scheduler is not running or dropped the request
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    /// A scheduled refresh exceeded its deadline
    #[error("Refresh timed out after {0} seconds")]
    Timeout(u64),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_messages() {
        assert_eq!(
            ProviderError::Throttled("RequestLimitExceeded".to_string()).to_string(),
            "Throttled by provider: RequestLimitExceeded"
        );
        assert_eq!(
            ProviderError::Timeout(1500).to_string(),
            "Provider call timed out after 1500 ms"
        );
        assert_eq!(
            ProviderError::ServerError(503).to_string(),
            "Provider error: HTTP 503"
        );
        assert_eq!(
            ProviderError::AccessDenied("UnauthorizedOperation".to_string()).to_string(),
            "Access denied: UnauthorizedOperation"
        );
    }

    #[test]
    fn test_provider_error_classification() {
        // Transient
        assert_eq!(
            ProviderError::Throttled("x".to_string()).class(),
            ErrorClass::Transient
        );
        assert_eq!(ProviderError::Timeout(10).class(), ErrorClass::Transient);
        assert_eq!(
            ProviderError::Network("reset".to_string()).class(),
            ErrorClass::Transient
        );
        assert_eq!(ProviderError::ServerError(500).class(), ErrorClass::Transient);
        assert_eq!(ProviderError::ServerError(503).class(), ErrorClass::Transient);

        // Permanent
        assert_eq!(ProviderError::ServerError(404).class(), ErrorClass::Permanent);
        assert_eq!(
            ProviderError::AccessDenied("x".to_string()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProviderError::InvalidScope("x".to_string()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProviderError::InvalidData("x".to_string()).class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_retryable_follows_class() {
        assert!(ProviderError::Timeout(1).is_retryable());
        assert!(ProviderError::Throttled("slow down".to_string()).is_retryable());
        assert!(!ProviderError::AccessDenied("no".to_string()).is_retryable());
        assert!(!ProviderError::ServerError(400).is_retryable());
    }

    #[test]
    fn test_no_data_available_message() {
        let err = SyncError::NoDataAvailable {
            kind: ResourceKind::Snapshot,
            account_id: "acct-1".to_string(),
            region: None,
        };
        assert_eq!(
            err.to_string(),
            "No data available for snapshot in account acct-1 (all regions)"
        );

        let err = SyncError::NoDataAvailable {
            kind: ResourceKind::Instance,
            account_id: "acct-1".to_string(),
            region: Some("eu-west-1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No data available for instance in account acct-1 (eu-west-1)"
        );

        assert_eq!(
            SyncError::Timeout(600).to_string(),
            "Refresh timed out after 600 seconds"
        );
    }

    #[test]
    fn test_store_error_from_sqlite() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());
        let err: StoreError = sqlite_err.into();

        match err {
            StoreError::Sqlite(_) => (),
            _ => panic!("Expected StoreError::Sqlite"),
        }
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::Transient.to_string(), "transient");
        assert_eq!(ErrorClass::Permanent.to_string(), "permanent");
    }
}
