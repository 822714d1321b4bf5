//! Error-classification infrastructure shared across tokenforge crates.
//!
//! Error types themselves stay module-specific; what this module provides is
//! the common vocabulary for talking about them. Any error that crosses a
//! module boundary implements [`ErrorClassification`] so callers can make
//! retry and alerting decisions without matching on concrete variants.

use std::fmt;
use std::time::Duration;

/// Unified severity levels for monitoring and alerting.
///
/// | Level | Use case |
/// |-------|----------|
/// | `Info` | Expected conditions (not found, empty results, cancellation) |
/// | `Warning` | Degraded but operational (transient failures, stale state) |
/// | `Error` | Failure requiring attention (misconfiguration, bad input) |
/// | `Critical` | System integrity at risk (storage access loss, corruption) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational; expected condition.
    Info,
    /// Degraded but operational.
    Warning,
    /// Failure requiring attention.
    Error,
    /// System integrity at risk; requires immediate attention.
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Standard interface for classifying errors by their characteristics.
///
/// Implementations enable consistent retry logic and unified monitoring
/// across modules. Module-specific error enums should implement this trait
/// rather than exposing ad-hoc `is_*` predicates.
pub trait ErrorClassification {
    /// Can the failed operation be retried as-is?
    fn is_retryable(&self) -> bool;

    /// How serious is this error?
    fn severity(&self) -> ErrorSeverity;

    /// Does this error require immediate attention?
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before retrying, when the error source provides one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
