//! Persistent secret storage.
//!
//! The [`SecretStore`] port abstracts platform-specific, encrypted blob
//! storage. Consumers treat stored bytes as opaque; encryption at rest is
//! the backend's responsibility (the OS keystore for [`KeychainStore`]).
//!
//! Backends are also responsible for preventing interleaved partial writes
//! from separate processes; the keystore's per-entry atomic update
//! semantics provide that here.

pub mod keychain;
pub mod store;

pub use keychain::KeychainStore;
pub use store::{SecretStore, SecretStoreError, StoreConfig};
