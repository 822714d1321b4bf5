//! The secret-store port and its configuration.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Immutable configuration for a secret store instance.
///
/// Passed into store constructors so there is no process-wide mutable
/// state naming cache locations or keychain services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Keystore service under which entries are filed
    /// (e.g. `"com.example.tokenforge"`).
    pub service_name: String,
    /// Identifier of the blob within the service (e.g. `"token-cache"`).
    pub store_id: String,
}

impl StoreConfig {
    /// Create a store configuration.
    #[must_use]
    pub fn new(service_name: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), store_id: store_id.into() }
    }
}

/// Errors surfaced by secret store backends.
///
/// Missing entries are not errors; `read` reports them as `Ok(None)`.
/// Undecodable entries are treated as missing by the backend (corrupt
/// entries reset rather than wedge their consumers).
#[derive(Debug, Clone, Error)]
pub enum SecretStoreError {
    /// The platform denied access to the store. Fatal to the caller;
    /// never retried.
    #[error("secret store access denied: {0}")]
    AccessDenied(String),

    /// The backend failed in a way that is not an access denial.
    #[error("secret store backend failure: {0}")]
    Backend(String),
}

impl ErrorClassification for SecretStoreError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AccessDenied(_) => ErrorSeverity::Critical,
            Self::Backend(_) => ErrorSeverity::Error,
        }
    }
}

/// Persistent, encrypted key/value storage for opaque blobs.
///
/// Implementations must guarantee that a `write` for a given `store_id` is
/// atomic with respect to concurrent reads of the same id, including reads
/// from other processes.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the blob stored under `store_id`, or `None` if absent.
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, SecretStoreError>;

    /// Store `data` under `store_id`, replacing any previous blob.
    async fn write(&self, store_id: &str, data: &[u8]) -> Result<(), SecretStoreError>;

    /// Remove the blob stored under `store_id` (idempotent).
    async fn delete(&self, store_id: &str) -> Result<(), SecretStoreError>;
}

#[cfg(test)]
mod tests {
    //! Unit tests for store configuration and error classification.
    use super::*;

    /// Access denial is critical and never retryable.
    #[test]
    fn access_denied_classification() {
        let err = SecretStoreError::AccessDenied("keychain locked".into());
        assert!(!err.is_retryable());
        assert!(err.is_critical());
    }

    /// Backend failures are errors but not critical.
    #[test]
    fn backend_failure_classification() {
        let err = SecretStoreError::Backend("dbus unavailable".into());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    /// Config fields are preserved verbatim.
    #[test]
    fn store_config_fields() {
        let config = StoreConfig::new("com.example.app", "token-cache");
        assert_eq!(config.service_name, "com.example.app");
        assert_eq!(config.store_id, "token-cache");
    }
}
