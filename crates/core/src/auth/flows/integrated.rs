//! Integrated platform credential flow: the OS-logged-in identity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::classify::{classify, ClassifiedError, ErrorKind};
use crate::auth::ports::PlatformBroker;
use crate::auth::types::{Account, CacheKey, TokenEntry};

/// Attempts non-interactive authentication with the current OS-logged-in
/// identity.
///
/// Fails fast with `ClientMisconfigured` when the platform does not
/// support integrated authentication for the account type; no network
/// traffic happens in that case.
pub struct IntegratedPlatformFlow {
    broker: Arc<dyn PlatformBroker>,
}

impl IntegratedPlatformFlow {
    /// Create an integrated-credential executor over the platform broker.
    #[must_use]
    pub fn new(broker: Arc<dyn PlatformBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl FlowExecutor for IntegratedPlatformFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::IntegratedPlatformCredential
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        if !self.broker.supports_integrated_auth() {
            return Err(ClassifiedError::new(
                ErrorKind::ClientMisconfigured,
                "integrated platform authentication is not supported on this host",
            ));
        }

        let username = request.account_hint.as_ref().map(|a| a.username.as_str());
        debug!(username = username.unwrap_or("<os identity>"), "integrated platform acquisition");

        let response = tokio::select! {
            () = request.cancellation.cancelled() => {
                return Err(ClassifiedError::cancelled("integrated platform flow cancelled"));
            }
            result = self.broker.acquire_integrated(&request.authority, &request.scopes, username) => {
                result.map_err(|raw| classify(&raw))?
            }
        };

        let account =
            Account::from_token_response(&response).or_else(|| request.account_hint.clone());
        let key = CacheKey::new(&request.authority, account.as_ref(), &request.scopes);
        Ok(TokenEntry::from_response(key, account, &request.scopes, response))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the integrated-credential executor.
    use super::*;
    use crate::auth::provider::RawProviderError;
    use crate::auth::types::{Authority, ScopeSet, TokenResponse};
    use crate::testing::MockPlatformBroker;

    fn request() -> FlowRequest {
        FlowRequest::new(
            Authority::new("https://login.example.com", "tenant", "client"),
            ScopeSet::new(["User.Read"]),
        )
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

    /// Unsupported hosts fail fast without touching the broker.
    #[tokio::test]
    async fn unsupported_host_fails_fast() {
        let broker = Arc::new(MockPlatformBroker::new().with_integrated_support(false));
        let flow = IntegratedPlatformFlow::new(broker.clone());

        let err = flow.execute(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientMisconfigured);
        assert_eq!(broker.integrated_calls(), 0);
    }

    /// A supported host acquires through the broker.
    #[tokio::test]
    async fn supported_host_acquires() {
        let broker = Arc::new(MockPlatformBroker::new());
        broker.set_integrated_result(Ok(response("integrated")));
        let flow = IntegratedPlatformFlow::new(broker.clone());

        let entry = flow.execute(&request()).await.unwrap();
        assert_eq!(entry.access_token, "integrated");
        assert_eq!(broker.integrated_calls(), 1);
    }

    /// A managed (non-federated) user surfaces the broker's classification.
    #[tokio::test]
    async fn managed_user_classifies() {
        let broker = Arc::new(MockPlatformBroker::new());
        broker.set_integrated_result(Err(RawProviderError::protocol(
            "invalid_client",
            "integrated authentication is not available for managed users",
        )));
        let flow = IntegratedPlatformFlow::new(broker);

        let err = flow.execute(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientMisconfigured);
    }
}
