//! Interactive browser flow: external user-agent authorization.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::classify::{classify, ClassifiedError, ErrorKind};
use crate::auth::pkce::{PkceChallenge, CHALLENGE_METHOD};
use crate::auth::ports::InteractiveSurface;
use crate::auth::provider::ProviderClient;
use crate::auth::types::{Account, Authority, CacheKey, ScopeSet, TokenEntry};

/// Drives an external user agent through the authorization-code flow with
/// PKCE and redeems the resulting code.
///
/// Blocks until redirect completion or cancellation. The orchestrator
/// guarantees at most one in-flight instance per authority/account pair.
pub struct InteractiveBrowserFlow {
    provider: Arc<dyn ProviderClient>,
    surface: Arc<dyn InteractiveSurface>,
}

impl InteractiveBrowserFlow {
    /// Create an interactive executor over the host's user-agent surface.
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderClient>, surface: Arc<dyn InteractiveSurface>) -> Self {
        Self { provider, surface }
    }

    fn build_authorize_url(
        authority: &Authority,
        scopes: &ScopeSet,
        pkce: &PkceChallenge,
        redirect_uri: &str,
        login_hint: Option<&str>,
    ) -> String {
        let scope = scopes.to_scope_string();
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", authority.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", pkce.state.as_str()),
            ("code_challenge", pkce.code_challenge.as_str()),
            ("code_challenge_method", CHALLENGE_METHOD),
        ];
        if let Some(hint) = login_hint {
            params.push(("login_hint", hint));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", authority.authorize_endpoint(), query)
    }
}

#[async_trait]
impl FlowExecutor for InteractiveBrowserFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::InteractiveBrowser
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        let pkce = PkceChallenge::generate();
        let redirect_uri = self.surface.redirect_uri().to_string();
        let login_hint = request.account_hint.as_ref().map(|a| a.username.as_str());

        let authorize_url = Self::build_authorize_url(
            &request.authority,
            &request.scopes,
            &pkce,
            &redirect_uri,
            login_hint,
        );

        info!("opening interactive authorization");

        let authorization = tokio::select! {
            () = request.cancellation.cancelled() => {
                return Err(ClassifiedError::cancelled("interactive flow cancelled"));
            }
            result = self.surface.authorize(&authorize_url, &request.cancellation) => {
                result.map_err(|raw| classify(&raw))?
            }
        };

        // CSRF guard: the provider must echo our state verbatim.
        if authorization.state != pkce.state {
            return Err(ClassifiedError::new(
                ErrorKind::Unknown,
                "authorization state mismatch on redirect completion",
            ));
        }

        debug!("authorization code received; redeeming");

        let response = self
            .provider
            .redeem_authorization_code(
                &request.authority,
                &request.scopes,
                &authorization.code,
                &pkce.code_verifier,
                &redirect_uri,
            )
            .await
            .map_err(|raw| classify(&raw))?;

        let account =
            Account::from_token_response(&response).or_else(|| request.account_hint.clone());
        let key = CacheKey::new(&request.authority, account.as_ref(), &request.scopes);
        Ok(TokenEntry::from_response(key, account, &request.scopes, response))
    }
}
