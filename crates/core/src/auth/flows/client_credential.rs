//! Client-credential flow: app-only tokens from a confidential identity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::classify::{classify, ClassifiedError, ErrorKind};
use crate::auth::provider::ProviderClient;
use crate::auth::types::{CacheKey, ScopeSet, TokenEntry};

/// Exchanges the authority's own credential for an app-only token.
///
/// Confidential identities only; public authorities are rejected before
/// any network call. The granted scope is the `/.default` scope derived
/// from the configured resource; no user context is involved and the
/// cache key carries no account.
pub struct ClientCredentialFlow {
    provider: Arc<dyn ProviderClient>,
}

impl ClientCredentialFlow {
    /// Create a client-credential executor.
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FlowExecutor for ClientCredentialFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::ClientCredential
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        if !request.authority.is_confidential() {
            return Err(ClassifiedError::new(
                ErrorKind::ClientMisconfigured,
                "client-credential flow requires a confidential identity",
            ));
        }

        let Some(resource_scope) = request.scopes.to_default_resource() else {
            return Err(ClassifiedError::new(
                ErrorKind::ClientMisconfigured,
                "no resource scope configured to derive an app-only scope from",
            ));
        };

        debug!(scope = %resource_scope, "client-credential acquisition");

        let response = tokio::select! {
            () = request.cancellation.cancelled() => {
                return Err(ClassifiedError::cancelled("client-credential flow cancelled"));
            }
            result = self.provider.client_credentials(&request.authority, &resource_scope) => {
                result.map_err(|raw| classify(&raw))?
            }
        };

        let granted = ScopeSet::new([resource_scope]);
        let key = CacheKey::app_only(&request.authority, &granted);
        Ok(TokenEntry::from_response(key, None, &granted, response))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the client-credential executor.
    use super::*;
    use crate::auth::types::{Authority, TokenResponse};
    use crate::testing::MockProviderClient;

    fn confidential() -> Authority {
        Authority::confidential("https://login.example.com", "tenant", "client", "s3cr3t")
    }

    fn scopes() -> ScopeSet {
        ScopeSet::new(["https://api.example.com/Forecast.Read"])
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

    /// A public authority is rejected before any provider call.
    #[tokio::test]
    async fn public_authority_rejected_before_network() {
        let provider = Arc::new(MockProviderClient::new());
        let flow = ClientCredentialFlow::new(provider.clone());

        let request = FlowRequest::new(
            Authority::new("https://login.example.com", "tenant", "client"),
            scopes(),
        );

        let err = flow.execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientMisconfigured);
        assert_eq!(provider.client_credential_calls(), 0);
    }

    /// The app-only token binds to the derived `/.default` scope with no
    /// account component.
    #[tokio::test]
    async fn derives_default_scope_and_app_only_key() {
        let provider = Arc::new(MockProviderClient::new());
        provider.set_client_credential_result(Ok(response("app-token")));
        let flow = ClientCredentialFlow::new(provider.clone());

        let request = FlowRequest::new(confidential(), scopes());
        let entry = flow.execute(&request).await.unwrap();

        assert_eq!(entry.access_token, "app-token");
        assert!(entry.account.is_none());
        assert_eq!(entry.key.account_id, None);
        assert_eq!(entry.scopes.as_slice(), ["https://api.example.com/.default"]);
        assert_eq!(
            provider.last_client_credential_scope().as_deref(),
            Some("https://api.example.com/.default")
        );
    }

    /// An underivable resource scope is a configuration error, not a
    /// provider round trip.
    #[tokio::test]
    async fn underivable_scope_rejected() {
        let provider = Arc::new(MockProviderClient::new());
        let flow = ClientCredentialFlow::new(provider.clone());

        let request = FlowRequest::new(confidential(), ScopeSet::new(["not-a-url"]));
        let err = flow.execute(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ClientMisconfigured);
        assert_eq!(provider.client_credential_calls(), 0);
    }
}
