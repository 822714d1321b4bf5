//! In-memory mock implementations of common ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::security::{SecretStore, SecretStoreError};

/// In-memory [`SecretStore`] for deterministic tests.
///
/// Clones share the same storage, so a test can hand one clone to the code
/// under test and inspect or corrupt the data through another. An injected
/// access-denied mode simulates a locked keystore.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    deny_access: Arc<AtomicBool>,
    write_count: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the simulated access-denied failure mode.
    pub fn set_deny_access(&self, deny: bool) {
        self.deny_access.store(deny, Ordering::SeqCst);
    }

    /// Place raw bytes into the store directly, bypassing the trait.
    ///
    /// Useful for seeding corrupt or externally-written blobs.
    pub fn inject(&self, store_id: &str, data: Vec<u8>) {
        // SAFETY: mutex poisoning is acceptable in test mocks
        self.data.lock().unwrap().insert(store_id.to_string(), data);
    }

    /// Snapshot the raw bytes currently stored under `store_id`.
    #[must_use]
    pub fn snapshot(&self, store_id: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(store_id).cloned()
    }

    /// Number of successful writes performed through the trait.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of blobs currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Check whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    fn check_access(&self) -> Result<(), SecretStoreError> {
        if self.deny_access.load(Ordering::SeqCst) {
            Err(SecretStoreError::AccessDenied("simulated access denial".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, SecretStoreError> {
        self.check_access()?;
        Ok(self.data.lock().unwrap().get(store_id).cloned())
    }

    async fn write(&self, store_id: &str, data: &[u8]) -> Result<(), SecretStoreError> {
        self.check_access()?;
        self.data.lock().unwrap().insert(store_id.to_string(), data.to_vec());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, store_id: &str) -> Result<(), SecretStoreError> {
        self.check_access()?;
        self.data.lock().unwrap().remove(store_id);
        Ok(())
    }
}
