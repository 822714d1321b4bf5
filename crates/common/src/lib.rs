//! Shared infrastructure for the tokenforge crates.
//!
//! This crate holds the concerns every other tokenforge crate leans on:
//!
//! - [`error`]: error-classification traits (`ErrorClassification`,
//!   `ErrorSeverity`) implemented by error types that cross module
//!   boundaries
//! - [`resilience`]: bounded retry with configurable backoff and jitter
//! - [`security`]: the [`security::SecretStore`] port for persistent,
//!   encrypted blob storage plus the platform-keychain implementation
//! - [`testing`]: in-memory mocks for deterministic tests (behind the
//!   `test-utils` feature)
//!
//! Domain logic lives in `tokenforge-core`; nothing in this crate knows
//! about tokens, authorities, or identity providers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;
pub mod security;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{ErrorClassification, ErrorSeverity};
pub use resilience::{
    retry_with_policy, BackoffStrategy, ClassificationPolicy, Jitter, RetryConfig, RetryDecision,
    RetryError, RetryPolicy, RetryResult,
};
pub use security::{KeychainStore, SecretStore, SecretStoreError, StoreConfig};
