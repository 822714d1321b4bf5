//! The identity-provider port and its HTTP implementation.
//!
//! The provider is a black box reached through one method per grant type.
//! Implementations return either a token response or a raw provider error;
//! classification happens at the flow-executor boundary, never here.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::types::{Authority, DeviceCodeChallenge, ScopeSet, TokenResponse};

/// Grant used for on-behalf-of user assertions.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Grant used when polling a device-code challenge.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// A provider failure before classification.
///
/// Protocol errors carry the raw OAuth error body; transport errors cover
/// everything that kept a response from arriving at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RawProviderError {
    /// The provider answered with an error body.
    #[error("{error}{}", error_description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Protocol {
        /// OAuth error code (e.g. `invalid_grant`).
        error: String,
        /// Human-readable description, often carrying diagnostic codes.
        error_description: Option<String>,
        /// Provider-specific refinement of the error code.
        suberror: Option<String>,
    },
    /// The provider could not be reached or answered unparseably.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RawProviderError {
    /// Protocol error with just a code, for tests and synthesized failures.
    #[must_use]
    pub fn protocol(error: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self::Protocol {
            error: error.into(),
            error_description: if description.is_empty() { None } else { Some(description) },
            suberror: None,
        }
    }
}

/// Outcome of one device-code poll.
#[derive(Debug, Clone)]
pub enum DeviceCodePoll {
    /// The user completed sign-in; tokens were issued.
    Issued(TokenResponse),
    /// The user has not finished yet; poll again after the interval.
    AuthorizationPending,
    /// The provider asked the client to slow its polling.
    SlowDown,
}

/// The identity provider, reached through grant-type operations.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Redeem a refresh token for a new access token.
    async fn redeem_refresh_token(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        refresh_token: &str,
    ) -> Result<TokenResponse, RawProviderError>;

    /// Start a device-code flow; returns the challenge to surface.
    async fn request_device_code(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
    ) -> Result<DeviceCodeChallenge, RawProviderError>;

    /// Poll a pending device-code challenge once.
    async fn poll_device_code(
        &self,
        authority: &Authority,
        device_code: &str,
    ) -> Result<DeviceCodePoll, RawProviderError>;

    /// Redeem an authorization code (with its PKCE verifier).
    async fn redeem_authorization_code(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, RawProviderError>;

    /// Exchange the authority's own credential for an app-only token.
    async fn client_credentials(
        &self,
        authority: &Authority,
        resource_scope: &str,
    ) -> Result<TokenResponse, RawProviderError>;

    /// Exchange an inbound user assertion for a downstream-scoped token.
    async fn on_behalf_of(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        assertion: &str,
    ) -> Result<TokenResponse, RawProviderError>;
}

/// Wire shape of a provider error body (RFC 6749 §5.2 plus extensions).
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    suberror: Option<String>,
}

impl From<ProviderErrorBody> for RawProviderError {
    fn from(body: ProviderErrorBody) -> Self {
        Self::Protocol {
            error: body.error,
            error_description: body.error_description,
            suberror: body.suberror,
        }
    }
}

/// HTTP implementation of [`ProviderClient`] over the v2.0 endpoints.
///
/// All grants are form posts against the authority's token endpoint; the
/// device-code flow additionally hits the device authorization endpoint.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: Option<reqwest::Client>,
}

impl HttpProviderClient {
    /// Create a provider client with a 30-second request timeout.
    ///
    /// Setting `TOKENFORGE_OAUTH_DISABLE_HTTP` leaves the client unbuilt so
    /// hermetic tests can construct orchestrators without network access.
    #[must_use]
    pub fn new() -> Self {
        let client = if std::env::var_os("TOKENFORGE_OAUTH_DISABLE_HTTP").is_some() {
            None
        } else {
            let builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30));
            Some(builder.build().unwrap_or_else(|_| reqwest::Client::new()))
        };
        Self { client }
    }

    fn client(&self) -> Result<&reqwest::Client, RawProviderError> {
        self.client
            .as_ref()
            .ok_or_else(|| RawProviderError::Transport("HTTP client disabled".to_string()))
    }

    async fn post_token_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, RawProviderError> {
        let response = self
            .client()?
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| RawProviderError::Transport(e.to_string()))?;

        Self::parse_token_response(response).await
    }

    async fn parse_token_response(
        response: reqwest::Response,
    ) -> Result<TokenResponse, RawProviderError> {
        if response.status().is_success() {
            response
                .json::<TokenResponse>()
                .await
                .map_err(|e| RawProviderError::Transport(format!("unparseable token response: {e}")))
        } else {
            let status = response.status();
            let body: ProviderErrorBody = response.json().await.map_err(|e| {
                RawProviderError::Transport(format!(
                    "unparseable error response (status {status}): {e}"
                ))
            })?;
            Err(body.into())
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn redeem_refresh_token(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        refresh_token: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        debug!(authority = %authority.authority_url(), "redeeming refresh token");

        let scope = scopes.to_scope_string();
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", authority.client_id.as_str()),
            ("scope", scope.as_str()),
            ("refresh_token", refresh_token),
            ("client_info", "1"),
        ];
        if let Some(secret) = authority.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        self.post_token_form(&authority.token_endpoint(), &form).await
    }

    async fn request_device_code(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
    ) -> Result<DeviceCodeChallenge, RawProviderError> {
        debug!(authority = %authority.authority_url(), "requesting device code");

        let scope = scopes.to_scope_string();
        let form =
            [("client_id", authority.client_id.as_str()), ("scope", scope.as_str())];

        let response = self
            .client()?
            .post(authority.device_code_endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| RawProviderError::Transport(e.to_string()))?;

        if response.status().is_success() {
            response.json::<DeviceCodeChallenge>().await.map_err(|e| {
                RawProviderError::Transport(format!("unparseable device code response: {e}"))
            })
        } else {
            let status = response.status();
            let body: ProviderErrorBody = response.json().await.map_err(|e| {
                RawProviderError::Transport(format!(
                    "unparseable error response (status {status}): {e}"
                ))
            })?;
            Err(body.into())
        }
    }

    async fn poll_device_code(
        &self,
        authority: &Authority,
        device_code: &str,
    ) -> Result<DeviceCodePoll, RawProviderError> {
        let form = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", authority.client_id.as_str()),
            ("device_code", device_code),
            ("client_info", "1"),
        ];

        let result = self.post_token_form(&authority.token_endpoint(), &form).await;

        match result {
            Ok(tokens) => Ok(DeviceCodePoll::Issued(tokens)),
            Err(RawProviderError::Protocol { ref error, .. })
                if error == "authorization_pending" =>
            {
                Ok(DeviceCodePoll::AuthorizationPending)
            }
            Err(RawProviderError::Protocol { ref error, .. }) if error == "slow_down" => {
                Ok(DeviceCodePoll::SlowDown)
            }
            Err(other) => Err(other),
        }
    }

    async fn redeem_authorization_code(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        debug!(authority = %authority.authority_url(), "redeeming authorization code");

        let scope = scopes.to_scope_string();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", authority.client_id.as_str()),
            ("scope", scope.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
            ("client_info", "1"),
        ];
        if let Some(secret) = authority.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        self.post_token_form(&authority.token_endpoint(), &form).await
    }

    async fn client_credentials(
        &self,
        authority: &Authority,
        resource_scope: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        debug!(authority = %authority.authority_url(), scope = %resource_scope, "client credentials grant");

        let secret = authority.client_secret.as_deref().unwrap_or_default();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", authority.client_id.as_str()),
            ("client_secret", secret),
            ("scope", resource_scope),
        ];

        self.post_token_form(&authority.token_endpoint(), &form).await
    }

    async fn on_behalf_of(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        assertion: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        debug!(authority = %authority.authority_url(), "on-behalf-of exchange");

        let scope = scopes.to_scope_string();
        let secret = authority.client_secret.as_deref().unwrap_or_default();
        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("client_id", authority.client_id.as_str()),
            ("client_secret", secret),
            ("assertion", assertion),
            ("scope", scope.as_str()),
            ("requested_token_use", "on_behalf_of"),
        ];

        self.post_token_form(&authority.token_endpoint(), &form).await
    }
}
