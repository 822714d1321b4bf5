//! Platform-keychain implementation of [`SecretStore`].
//!
//! Persists blobs via the OS keystore: macOS Keychain, Windows Credential
//! Manager, or the Linux Secret Service API, through the `keyring` crate.
//! Keystore entries are strings, so blobs are base64-armored on the way in
//! and decoded on the way out. An entry that no longer decodes is treated
//! as absent rather than surfaced as an error; the consumer sees a reset,
//! not a wedge.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyring::Entry;
use tracing::{debug, warn};

use super::store::{SecretStore, SecretStoreError, StoreConfig};

/// Secret store backed by the platform keychain.
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Create a keychain store for the configured service.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self { service_name: config.service_name.clone() }
    }

    fn entry(&self, store_id: &str) -> Result<Entry, SecretStoreError> {
        Entry::new(&self.service_name, store_id).map_err(|e| {
            SecretStoreError::Backend(format!("failed to create keychain entry: {e}"))
        })
    }

    fn map_keyring_error(err: keyring::Error, operation: &str) -> SecretStoreError {
        match err {
            keyring::Error::NoStorageAccess(e) => SecretStoreError::AccessDenied(format!(
                "keychain refused {operation} access: {e}"
            )),
            other => SecretStoreError::Backend(format!("keychain {operation} failed: {other}")),
        }
    }
}

#[async_trait]
impl SecretStore for KeychainStore {
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, SecretStoreError> {
        debug!(service = %self.service_name, store_id = %store_id, "reading keychain blob");

        let entry = self.entry(store_id)?;
        let armored = match entry.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(other) => return Err(Self::map_keyring_error(other, "read")),
        };

        match BASE64.decode(armored.as_bytes()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                // Corrupt armor: reset the entry instead of wedging callers.
                warn!(
                    service = %self.service_name,
                    store_id = %store_id,
                    error = %e,
                    "stored blob is not valid base64; treating as absent"
                );
                Ok(None)
            }
        }
    }

    async fn write(&self, store_id: &str, data: &[u8]) -> Result<(), SecretStoreError> {
        debug!(
            service = %self.service_name,
            store_id = %store_id,
            bytes = data.len(),
            "writing keychain blob"
        );

        let entry = self.entry(store_id)?;
        let armored = BASE64.encode(data);
        entry
            .set_password(&armored)
            .map_err(|e| Self::map_keyring_error(e, "write"))
    }

    async fn delete(&self, store_id: &str) -> Result<(), SecretStoreError> {
        debug!(service = %self.service_name, store_id = %store_id, "deleting keychain blob");

        let entry = self.entry(store_id)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(other) => Err(Self::map_keyring_error(other, "delete")),
        }
    }
}
