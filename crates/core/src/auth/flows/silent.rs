//! Silent acquisition from cache, with refresh when stale.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::cache::TokenCache;
use crate::auth::classify::{classify, ClassifiedError, ErrorKind};
use crate::auth::provider::ProviderClient;
use crate::auth::types::{Account, CacheKey, TokenEntry};

/// Looks up the token cache and silently refreshes stale entries.
///
/// Never prompts. Fails with an `InvalidGrant`-classified error when no
/// usable cache or refresh state exists, which the orchestrator treats as
/// the signal to escalate.
pub struct SilentCacheFlow {
    cache: Arc<TokenCache>,
    provider: Arc<dyn ProviderClient>,
}

impl SilentCacheFlow {
    /// Create a silent executor over the shared cache and provider.
    #[must_use]
    pub fn new(cache: Arc<TokenCache>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { cache, provider }
    }
}

#[async_trait]
impl FlowExecutor for SilentCacheFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::SilentCache
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        let Some(account) = request.account_hint.as_ref() else {
            return Err(ClassifiedError::new(
                ErrorKind::InvalidGrant,
                "no account available for silent authentication",
            ));
        };

        let key = CacheKey::new(&request.authority, Some(account), &request.scopes);

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(username = %account.username, "silent cache hit");
                return Ok(entry);
            }
            Ok(None) => {}
            Err(e) => return Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string())),
        }

        let refresh_token = match self.cache.refresh_artifact(&key).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err(ClassifiedError::new(
                    ErrorKind::InvalidGrant,
                    "no cached token or refresh artifact for this account and scope set",
                ));
            }
            Err(e) => return Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string())),
        };

        debug!(username = %account.username, "cached token stale; attempting silent refresh");

        let response = self
            .provider
            .redeem_refresh_token(&request.authority, &request.scopes, &refresh_token)
            .await
            .map_err(|raw| classify(&raw))?;

        let refreshed_account =
            Account::from_token_response(&response).or_else(|| Some(account.clone()));
        let mut entry =
            TokenEntry::from_response(key, refreshed_account, &request.scopes, response);

        // Providers may rotate or omit the refresh token; keep the old
        // artifact when no new one was issued.
        if entry.refresh_token.is_none() {
            entry.refresh_token = Some(refresh_token);
        }

        if let Err(e) = self.cache.put(entry.clone()).await {
            return Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string()));
        }

        Ok(entry)
    }
}
