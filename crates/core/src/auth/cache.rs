//! The persistent token cache.
//!
//! One serialized blob per store id, kept in the secret store. Every read
//! path reloads the blob first, so entries written by other processes
//! become visible between operations; writes serialize behind a mutex and
//! swap the whole blob, so readers never observe a partial entry.
//!
//! `get` never returns an entry past expiry minus the skew tolerance. The
//! underlying blob retains stale entries for their refresh artifacts;
//! [`TokenCache::refresh_artifact`] is the accessor for that path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tokenforge_common::{ErrorClassification, ErrorSeverity, SecretStore, SecretStoreError};

use super::types::{Account, Authority, CacheKey, TokenEntry};

/// Default clock-skew tolerance in seconds.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Errors surfaced by cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The secret store failed underneath the cache.
    #[error(transparent)]
    Store(#[from] SecretStoreError),

    /// The cache blob could not be serialized for writing.
    #[error("cache serialization failed: {0}")]
    Serialization(String),
}

impl ErrorClassification for CacheError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Store(e) => e.severity(),
            Self::Serialization(_) => ErrorSeverity::Error,
        }
    }
}

/// Persisted cache shape. Private to this module; callers only ever see
/// [`TokenEntry`] values.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheBlob {
    version: u32,
    entries: Vec<TokenEntry>,
}

const BLOB_VERSION: u32 = 1;

/// Structured index over the secret store, keyed by
/// (authority, account-or-none, normalized scope set).
pub struct TokenCache {
    store: Arc<dyn SecretStore>,
    store_id: String,
    skew_seconds: i64,
    write_lock: Mutex<()>,
}

impl TokenCache {
    /// Create a cache over the given store, reading and writing the blob
    /// named `store_id`, with the default clock-skew tolerance.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, store_id: impl Into<String>) -> Self {
        Self::with_skew(store, store_id, DEFAULT_CLOCK_SKEW_SECS)
    }

    /// Create a cache with an explicit clock-skew tolerance in seconds.
    #[must_use]
    pub fn with_skew(
        store: Arc<dyn SecretStore>,
        store_id: impl Into<String>,
        skew_seconds: i64,
    ) -> Self {
        Self { store, store_id: store_id.into(), skew_seconds, write_lock: Mutex::new(()) }
    }

    /// The configured clock-skew tolerance in seconds.
    #[must_use]
    pub fn skew_seconds(&self) -> i64 {
        self.skew_seconds
    }

    /// Look up a valid entry for the key.
    ///
    /// Entries past expiry minus the skew tolerance report as a miss even
    /// though the blob may retain them for refresh.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<TokenEntry>, CacheError> {
        let blob = self.load().await?;
        let entry = blob.entries.iter().find(|e| &e.key == key);

        match entry {
            Some(e) if e.is_valid(self.skew_seconds) => Ok(Some(e.clone())),
            Some(e) => {
                debug!(
                    seconds_until_expiry = e.seconds_until_expiry(),
                    skew = self.skew_seconds,
                    "cached entry within skew tolerance; reporting miss"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// The refresh token stored for a key, regardless of access-token
    /// staleness.
    pub async fn refresh_artifact(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let blob = self.load().await?;
        Ok(blob
            .entries
            .iter()
            .find(|e| &e.key == key)
            .and_then(|e| e.refresh_token.clone()))
    }

    /// Insert or replace the entry for its key. Linearized per cache;
    /// the last successful write wins and is immediately visible.
    pub async fn put(&self, entry: TokenEntry) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut blob = self.load().await?;
        blob.entries.retain(|e| e.key != entry.key);
        blob.entries.push(entry);
        self.save(&blob).await?;

        debug!(entries = blob.entries.len(), "token cache updated");
        Ok(())
    }

    /// Remove the entry for a single key (invalid-grant handling).
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut blob = self.load().await?;
        let before = blob.entries.len();
        blob.entries.retain(|e| &e.key != key);
        if blob.entries.len() != before {
            self.save(&blob).await?;
            debug!("discarded cache entry");
        }
        Ok(())
    }

    /// Remove every entry belonging to the account (sign-out). App-only
    /// entries are untouched.
    pub async fn invalidate(&self, account: &Account) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut blob = self.load().await?;
        let before = blob.entries.len();
        blob.entries.retain(|e| {
            e.account
                .as_ref()
                .map(|a| a.home_account_id != account.home_account_id)
                .unwrap_or(true)
        });

        if blob.entries.len() != before {
            self.save(&blob).await?;
            info!(
                username = %account.username,
                removed = before - blob.entries.len(),
                "account signed out of token cache"
            );
        }
        Ok(())
    }

    /// Distinct accounts with cached entries for the authority,
    /// deduplicated by home-account identifier.
    pub async fn list_accounts(&self, authority: &Authority) -> Result<Vec<Account>, CacheError> {
        let discriminator = authority.discriminator();
        let blob = self.load().await?;

        let mut accounts: Vec<Account> = Vec::new();
        for entry in blob.entries.iter().filter(|e| e.key.authority == discriminator) {
            if let Some(account) = entry.account.as_ref() {
                if !accounts.iter().any(|a| a.home_account_id == account.home_account_id) {
                    accounts.push(account.clone());
                }
            }
        }
        Ok(accounts)
    }

    async fn load(&self) -> Result<CacheBlob, CacheError> {
        let raw = self.store.read(&self.store_id).await?;
        let Some(bytes) = raw else {
            return Ok(CacheBlob { version: BLOB_VERSION, entries: Vec::new() });
        };

        match serde_json::from_slice::<CacheBlob>(&bytes) {
            Ok(blob) => Ok(blob),
            Err(e) => {
                // Corrupt blob: reset rather than wedge every caller.
                warn!(error = %e, store_id = %self.store_id, "token cache blob corrupt; resetting");
                Ok(CacheBlob { version: BLOB_VERSION, entries: Vec::new() })
            }
        }
    }

    async fn save(&self, blob: &CacheBlob) -> Result<(), CacheError> {
        let bytes =
            serde_json::to_vec(blob).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.store.write(&self.store_id, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the token cache.
    use chrono::{Duration, Utc};
    use tokenforge_common::testing::MemorySecretStore;

    use super::*;
    use crate::auth::types::{ScopeSet, TokenResponse};

    fn authority() -> Authority {
        Authority::new("https://login.example.com", "tenant", "client")
    }

    fn response(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in,
            scope: None,
            client_info: None,
        }
    }

    fn entry_for(account: Option<Account>, scopes: &[&str], expires_in: i64) -> TokenEntry {
        let scopes = ScopeSet::new(scopes.iter().copied());
        let key = CacheKey::new(&authority(), account.as_ref(), &scopes);
        TokenEntry::from_response(key, account, &scopes, response(expires_in))
    }

    fn cache() -> (TokenCache, MemorySecretStore) {
        let store = MemorySecretStore::new();
        (TokenCache::new(Arc::new(store.clone()), "token-cache"), store)
    }

    /// Valid entries round-trip unchanged through put/get.
    #[tokio::test]
    async fn put_get_roundtrip() {
        let (cache, _store) = cache();
        let account = Account::new("uid.utid", "user@example.com", "utid");
        let entry = entry_for(Some(account), &["User.Read"], 3600);

        cache.put(entry.clone()).await.unwrap();
        let hit = cache.get(&entry.key).await.unwrap();
        assert_eq!(hit, Some(entry));
    }

    /// An entry expiring inside the skew tolerance reports a miss while
    /// its refresh artifact stays reachable.
    #[tokio::test]
    async fn stale_entry_misses_but_keeps_refresh_artifact() {
        let (cache, _store) = cache();
        // Expires in 30 seconds; default tolerance is 300.
        let entry = entry_for(None, &["api"], 30);
        let key = entry.key.clone();

        cache.put(entry).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert_eq!(cache.refresh_artifact(&key).await.unwrap(), Some("rt".to_string()));
    }

    /// An entry past absolute expiry also misses.
    #[tokio::test]
    async fn expired_entry_misses() {
        let (cache, _store) = cache();
        let mut entry = entry_for(None, &["api"], 3600);
        entry.expires_at = Utc::now() - Duration::seconds(10);
        let key = entry.key.clone();

        cache.put(entry).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    /// The last write for a key wins and is immediately visible.
    #[tokio::test]
    async fn last_write_wins() {
        let (cache, _store) = cache();
        let first = entry_for(None, &["api"], 3600);
        let mut second = first.clone();
        second.access_token = "newer".to_string();

        cache.put(first.clone()).await.unwrap();
        cache.put(second.clone()).await.unwrap();

        let hit = cache.get(&first.key).await.unwrap().unwrap();
        assert_eq!(hit.access_token, "newer");
    }

    /// A corrupt blob resets the cache instead of failing operations.
    #[tokio::test]
    async fn corrupt_blob_resets() {
        let (cache, store) = cache();
        store.inject("token-cache", b"not json at all".to_vec());

        let entry = entry_for(None, &["api"], 3600);
        assert_eq!(cache.get(&entry.key).await.unwrap(), None);

        // The cache remains writable after the reset.
        cache.put(entry.clone()).await.unwrap();
        assert!(cache.get(&entry.key).await.unwrap().is_some());
    }

    /// Access denial from the store is surfaced, never swallowed.
    #[tokio::test]
    async fn access_denied_surfaces() {
        let (cache, store) = cache();
        store.set_deny_access(true);

        let entry = entry_for(None, &["api"], 3600);
        let err = cache.get(&entry.key).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(SecretStoreError::AccessDenied(_))));
        assert!(err.is_critical());
    }

    /// Entries written by another cache instance over the same store are
    /// visible without any coordination.
    #[tokio::test]
    async fn cross_instance_visibility() {
        let store = MemorySecretStore::new();
        let writer = TokenCache::new(Arc::new(store.clone()), "token-cache");
        let reader = TokenCache::new(Arc::new(store), "token-cache");

        let entry = entry_for(None, &["api"], 3600);
        writer.put(entry.clone()).await.unwrap();

        assert_eq!(reader.get(&entry.key).await.unwrap(), Some(entry));
    }

    /// Sign-out removes the account's entries and leaves app-only entries.
    #[tokio::test]
    async fn invalidate_account_spares_app_only() {
        let (cache, _store) = cache();
        let account = Account::new("uid.utid", "user@example.com", "utid");
        let user_entry = entry_for(Some(account.clone()), &["User.Read"], 3600);
        let app_entry = entry_for(None, &["api"], 3600);

        cache.put(user_entry.clone()).await.unwrap();
        cache.put(app_entry.clone()).await.unwrap();

        cache.invalidate(&account).await.unwrap();

        assert_eq!(cache.get(&user_entry.key).await.unwrap(), None);
        assert!(cache.get(&app_entry.key).await.unwrap().is_some());
    }

    /// Accounts list per authority, deduplicated by home-account id.
    #[tokio::test]
    async fn list_accounts_dedups() {
        let (cache, _store) = cache();
        let account = Account::new("uid.utid", "user@example.com", "utid");

        cache.put(entry_for(Some(account.clone()), &["User.Read"], 3600)).await.unwrap();
        cache.put(entry_for(Some(account.clone()), &["Mail.Read"], 3600)).await.unwrap();
        cache.put(entry_for(None, &["api"], 3600)).await.unwrap();

        let accounts = cache.list_accounts(&authority()).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].home_account_id, "uid.utid");

        let other = Authority::new("https://login.example.com", "other-tenant", "client");
        assert!(cache.list_accounts(&other).await.unwrap().is_empty());
    }

    /// Removing a key is idempotent and does not disturb other entries.
    #[tokio::test]
    async fn remove_is_scoped_and_idempotent() {
        let (cache, _store) = cache();
        let keep = entry_for(None, &["keep"], 3600);
        let drop = entry_for(None, &["drop"], 3600);

        cache.put(keep.clone()).await.unwrap();
        cache.put(drop.clone()).await.unwrap();

        cache.remove(&drop.key).await.unwrap();
        cache.remove(&drop.key).await.unwrap();

        assert!(cache.get(&keep.key).await.unwrap().is_some());
        assert_eq!(cache.get(&drop.key).await.unwrap(), None);
    }
}
