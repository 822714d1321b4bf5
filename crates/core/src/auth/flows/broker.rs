//! Broker-assisted flow: delegation to the OS authentication broker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::interactive::InteractiveBrowserFlow;
use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::cache::TokenCache;
use crate::auth::classify::{classify, ClassifiedError};
use crate::auth::ports::PlatformBroker;
use crate::auth::types::{Account, CacheKey, TokenEntry};

/// Delegates authentication to the platform broker.
///
/// With a known account (hint or cached), attempts silent broker-mediated
/// acquisition; with none, falls back to the interactive browser flow for
/// the first sign-in. Platform availability is checked at orchestrator
/// construction, not here.
pub struct BrokerAssistedFlow {
    broker: Arc<dyn PlatformBroker>,
    cache: Arc<TokenCache>,
    interactive: Arc<InteractiveBrowserFlow>,
}

impl BrokerAssistedFlow {
    /// Create a broker-assisted executor with its interactive fallback.
    #[must_use]
    pub fn new(
        broker: Arc<dyn PlatformBroker>,
        cache: Arc<TokenCache>,
        interactive: Arc<InteractiveBrowserFlow>,
    ) -> Self {
        Self { broker, cache, interactive }
    }

    async fn resolve_account(&self, request: &FlowRequest) -> Option<Account> {
        if let Some(account) = request.account_hint.as_ref() {
            return Some(account.clone());
        }
        self.cache
            .list_accounts(&request.authority)
            .await
            .ok()
            .and_then(|accounts| accounts.into_iter().next())
    }
}

#[async_trait]
impl FlowExecutor for BrokerAssistedFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::BrokerAssisted
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        if request.cancellation.is_cancelled() {
            return Err(ClassifiedError::cancelled("broker flow cancelled"));
        }

        let Some(account) = self.resolve_account(request).await else {
            // First use: no account anywhere; hand off to the browser.
            debug!("no broker account available; falling back to interactive sign-in");
            return self.interactive.execute(request).await;
        };

        debug!(username = %account.username, "silent broker-mediated acquisition");

        let response = tokio::select! {
            () = request.cancellation.cancelled() => {
                return Err(ClassifiedError::cancelled("broker flow cancelled"));
            }
            result = self.broker.acquire_silent(&request.authority, &request.scopes, &account) => {
                result.map_err(|raw| classify(&raw))?
            }
        };

        let account = Account::from_token_response(&response).unwrap_or(account);
        let key = CacheKey::new(&request.authority, Some(&account), &request.scopes);
        Ok(TokenEntry::from_response(key, Some(account), &request.scopes, response))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the broker-assisted executor.
    use tokenforge_common::testing::MemorySecretStore;

    use super::*;
    use crate::auth::types::{Authority, ScopeSet, TokenResponse};
    use crate::testing::{MockInteractiveSurface, MockPlatformBroker, MockProviderClient};

    fn authority() -> Authority {
        Authority::new("https://login.example.com", "tenant", "client")
    }

    fn request() -> FlowRequest {
        FlowRequest::new(authority(), ScopeSet::new(["User.Read"]))
    }

    fn response(token: &str) -> TokenResponse {
        TokenResponse {
            access_token: token.to_string(),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: None,
            client_info: None,
        }
    }

    fn harness() -> (
        BrokerAssistedFlow,
        Arc<TokenCache>,
        Arc<MockPlatformBroker>,
        Arc<MockInteractiveSurface>,
        Arc<MockProviderClient>,
    ) {
        let cache = Arc::new(TokenCache::new(Arc::new(MemorySecretStore::new()), "cache"));
        let broker = Arc::new(MockPlatformBroker::new());
        let provider = Arc::new(MockProviderClient::new());
        let surface = Arc::new(MockInteractiveSurface::new("http://localhost:8400/callback"));
        let interactive =
            Arc::new(InteractiveBrowserFlow::new(provider.clone(), surface.clone()));
        let flow = BrokerAssistedFlow::new(broker.clone(), cache.clone(), interactive);
        (flow, cache, broker, surface, provider)
    }

    /// No cached account: the flow falls back to interactive sign-in.
    #[tokio::test]
    async fn first_use_falls_back_to_interactive() {
        let (flow, _cache, broker, surface, provider) = harness();
        surface.set_code("auth-code");
        provider.set_auth_code_result(Ok(response("from-browser")));

        let entry = flow.execute(&request()).await.unwrap();
        assert_eq!(entry.access_token, "from-browser");
        assert_eq!(surface.authorize_calls(), 1);
        assert_eq!(broker.silent_calls(), 0);
    }

    /// A cached account routes through silent broker acquisition.
    #[tokio::test]
    async fn cached_account_uses_broker_silently() {
        let (flow, cache, broker, surface, _provider) = harness();
        broker.set_silent_result(Ok(response("from-broker")));

        // Seed the cache with an account for this authority.
        let account = Account::new("uid.utid", "user@example.com", "utid");
        let scopes = ScopeSet::new(["User.Read"]);
        let key = CacheKey::new(&authority(), Some(&account), &scopes);
        cache
            .put(TokenEntry::from_response(
                key,
                Some(account),
                &scopes,
                response("old"),
            ))
            .await
            .unwrap();

        let entry = flow.execute(&request()).await.unwrap();
        assert_eq!(entry.access_token, "from-broker");
        assert_eq!(broker.silent_calls(), 1);
        assert_eq!(surface.authorize_calls(), 0);
    }

    /// An account hint bypasses the cache lookup entirely.
    #[tokio::test]
    async fn account_hint_used_directly() {
        let (flow, _cache, broker, _surface, _provider) = harness();
        broker.set_silent_result(Ok(response("hinted")));

        let mut req = request();
        req.account_hint = Some(Account::new("uid.utid", "user@example.com", "utid"));

        let entry = flow.execute(&req).await.unwrap();
        assert_eq!(entry.access_token, "hinted");
        assert_eq!(entry.account.as_ref().unwrap().home_account_id, "uid.utid");
    }
}
