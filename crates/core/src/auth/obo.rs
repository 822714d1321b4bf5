//! On-behalf-of exchange for confidential server contexts.
//!
//! Takes an inbound caller token and exchanges it for a downstream-scoped
//! token using the authority's own credential as the confidential leg of
//! the trust chain. This component runs in a non-interactive context by
//! definition: consent and step-up conditions surface upward for the
//! caller's own interactive surface (e.g. a web challenge) to resolve.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::cache::TokenCache;
use super::classify::{classify, ClassifiedError, ErrorKind};
use super::flows::FlowResult;
use super::provider::ProviderClient;
use super::types::{Authority, CacheKey, ScopeSet, TokenEntry};

/// Exchanges inbound user assertions for downstream tokens.
///
/// Bound to one confidential authority. Exchanged tokens are cached per
/// caller, partitioned by a digest of the inbound assertion, so repeated
/// requests from the same caller skip the provider round trip.
pub struct OnBehalfOfExchanger {
    authority: Authority,
    provider: Arc<dyn ProviderClient>,
    cache: Arc<TokenCache>,
}

impl OnBehalfOfExchanger {
    /// Create an exchanger for the authority.
    #[must_use]
    pub fn new(
        authority: Authority,
        provider: Arc<dyn ProviderClient>,
        cache: Arc<TokenCache>,
    ) -> Self {
        Self { authority, provider, cache }
    }

    /// Exchange an inbound token for a downstream-scoped token.
    ///
    /// A public (non-confidential) authority is rejected with
    /// `ClientMisconfigured` before any network call.
    pub async fn exchange(&self, inbound_token: &str, scopes: &ScopeSet) -> FlowResult {
        if !self.authority.is_confidential() {
            return Err(ClassifiedError::new(
                ErrorKind::ClientMisconfigured,
                "on-behalf-of exchange requires a confidential identity",
            ));
        }
        if inbound_token.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::InvalidGrant,
                "inbound assertion is empty",
            ));
        }

        let assertion_id = digest_assertion(inbound_token);
        let key = CacheKey::on_behalf_of(&self.authority, &assertion_id, scopes);

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!("on-behalf-of cache hit");
                return Ok(entry);
            }
            Ok(None) => {}
            Err(e) => return Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string())),
        }

        let response = self
            .provider
            .on_behalf_of(&self.authority, scopes, inbound_token)
            .await
            .map_err(|raw| classify(&raw))?;

        let entry = TokenEntry::from_response(key, None, scopes, response);
        if let Err(e) = self.cache.put(entry.clone()).await {
            return Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string()));
        }

        info!("on-behalf-of exchange completed");
        Ok(entry)
    }
}

/// Stable, non-reversible discriminator for partitioning cached
/// downstream tokens per caller.
fn digest_assertion(assertion: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(assertion.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    //! Unit tests for the on-behalf-of exchanger.
    use tokenforge_common::testing::MemorySecretStore;

    use super::*;
    use crate::auth::provider::RawProviderError;
    use crate::auth::types::TokenResponse;
    use crate::testing::MockProviderClient;

    fn confidential() -> Authority {
        Authority::confidential("https://login.example.com", "tenant", "api-client", "s3cr3t")
    }

    fn scopes() -> ScopeSet {
        ScopeSet::new(["https://graph.example.com/.default"])
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

    fn harness(authority: Authority) -> (OnBehalfOfExchanger, Arc<MockProviderClient>) {
        let cache = Arc::new(TokenCache::new(Arc::new(MemorySecretStore::new()), "obo-cache"));
        let provider = Arc::new(MockProviderClient::new());
        (OnBehalfOfExchanger::new(authority, provider.clone(), cache), provider)
    }

    /// A public authority is rejected before the provider is consulted.
    #[tokio::test]
    async fn public_authority_rejected_before_network() {
        let (exchanger, provider) =
            harness(Authority::new("https://login.example.com", "tenant", "api-client"));

        let err = exchanger.exchange("inbound-token", &scopes()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientMisconfigured);
        assert_eq!(provider.obo_calls(), 0);
    }

    /// A valid exchange returns a token scoped to the request and caches
    /// it for the same caller.
    #[tokio::test]
    async fn exchange_caches_per_assertion() {
        let (exchanger, provider) = harness(confidential());
        provider.set_obo_result(Ok(response("downstream")));

        let first = exchanger.exchange("caller-token", &scopes()).await.unwrap();
        assert_eq!(first.access_token, "downstream");
        assert_eq!(first.scopes.as_slice(), ["https://graph.example.com/.default"]);

        // Second exchange for the same caller: cache hit, one round trip.
        let second = exchanger.exchange("caller-token", &scopes()).await.unwrap();
        assert_eq!(second.access_token, "downstream");
        assert_eq!(provider.obo_calls(), 1);

        // A different caller does not share the entry.
        provider.set_obo_result(Ok(response("other-downstream")));
        let other = exchanger.exchange("other-token", &scopes()).await.unwrap();
        assert_eq!(other.access_token, "other-downstream");
        assert_eq!(provider.obo_calls(), 2);
    }

    /// Consent conditions surface upward unmodified; this context cannot
    /// prompt.
    #[tokio::test]
    async fn consent_required_surfaces() {
        let (exchanger, provider) = harness(confidential());
        provider.set_obo_result(Err(RawProviderError::protocol(
            "interaction_required",
            "AADSTS65001: The user or administrator has not consented.",
        )));

        let err = exchanger.exchange("caller-token", &scopes()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsentRequired);
    }

    /// An empty inbound assertion never reaches the provider.
    #[tokio::test]
    async fn empty_assertion_rejected() {
        let (exchanger, provider) = harness(confidential());

        let err = exchanger.exchange("", &scopes()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert_eq!(provider.obo_calls(), 0);
    }
}
