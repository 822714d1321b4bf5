//! Test utilities shared by tokenforge crates.
//!
//! Available to downstream crates via the `test-utils` feature so their
//! tests run against deterministic in-memory backends instead of the
//! platform keychain.

pub mod mocks;

pub use mocks::MemorySecretStore;
