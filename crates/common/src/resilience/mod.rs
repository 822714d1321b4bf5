//! Resilience primitives for operations that talk to unreliable backends.
//!
//! Currently this is the bounded retry executor; callers that need
//! fallback-chain or escalation behavior build it on top of these
//! primitives rather than inside them.

pub mod retry;

pub use retry::{
    retry_with_policy, BackoffStrategy, ClassificationPolicy, Jitter, RetryConfig, RetryDecision,
    RetryError, RetryPolicy, RetryResult,
};
