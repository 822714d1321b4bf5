//! Core identity and token types.
//!
//! These types carry configuration in (authorities, scopes), cached state
//! through (accounts, cache keys, token entries), and provider responses
//! back out. Everything that lands in the persistent cache round-trips
//! through serde losslessly.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An identity provider endpoint plus tenant and client identity context.
///
/// Distinguishes public identities (no secret; device and CLI apps) from
/// confidential identities (server apps able to hold a secret). Immutable
/// once constructed; sourced from external configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Authority {
    /// Provider instance URL, e.g. `https://login.example.com`.
    pub instance_url: String,
    /// Directory/tenant identifier appended to the instance URL.
    pub tenant_id: String,
    /// Application (client) identifier.
    pub client_id: String,
    /// Client secret; present only for confidential identities.
    pub client_secret: Option<String>,
}

impl Authority {
    /// Create a public-client authority (no secret).
    #[must_use]
    pub fn new(
        instance_url: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_url: instance_url.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    /// Create a confidential-client authority holding a secret.
    #[must_use]
    pub fn confidential(
        instance_url: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            instance_url: instance_url.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
        }
    }

    /// Whether this identity can hold a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    /// The tenanted authority URL: instance joined with tenant.
    #[must_use]
    pub fn authority_url(&self) -> String {
        format!("{}/{}", self.instance_url.trim_end_matches('/'), self.tenant_id)
    }

    /// The v2.0 token endpoint for this authority.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority_url())
    }

    /// The v2.0 device authorization endpoint for this authority.
    #[must_use]
    pub fn device_code_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority_url())
    }

    /// The v2.0 authorization endpoint for this authority.
    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority_url())
    }

    /// Stable cache discriminator: authority URL plus client id, folded to
    /// lowercase so differently-cased configuration hits the same entries.
    #[must_use]
    pub fn discriminator(&self) -> String {
        format!("{}|{}", self.authority_url(), self.client_id).to_lowercase()
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("instance_url", &self.instance_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A previously-authenticated principal.
///
/// Multiple flows may resolve to the same account; `home_account_id` is
/// the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier for the principal across flows and sessions.
    pub home_account_id: String,
    /// Display username (UPN or preferred username).
    pub username: String,
    /// Tenant the account belongs to.
    pub tenant_id: String,
}

impl Account {
    /// Create an account record.
    #[must_use]
    pub fn new(
        home_account_id: impl Into<String>,
        username: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            home_account_id: home_account_id.into(),
            username: username.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Derive an account from a token response, when the provider included
    /// enough identity material.
    ///
    /// Prefers the `client_info` blob (`{uid, utid}` → `uid.utid`), falling
    /// back to unverified id-token claims (`oid`/`tid`, `preferred_username`
    /// or `upn`). Claims are decoded, not validated; token validation is a
    /// relying-party concern, not an acquisition concern.
    #[must_use]
    pub fn from_token_response(response: &TokenResponse) -> Option<Self> {
        let id_claims = response.id_token.as_deref().and_then(decode_jwt_claims);

        let username = id_claims
            .as_ref()
            .and_then(|c| {
                c.get("preferred_username")
                    .or_else(|| c.get("upn"))
                    .and_then(|v| v.as_str())
            })
            .unwrap_or_default()
            .to_string();

        if let Some(info) = response.client_info.as_deref().and_then(decode_client_info) {
            return Some(Self {
                home_account_id: format!("{}.{}", info.uid, info.utid),
                username,
                tenant_id: info.utid,
            });
        }

        let claims = id_claims?;
        let oid = claims.get("oid").and_then(|v| v.as_str())?;
        let tid = claims.get("tid").and_then(|v| v.as_str()).unwrap_or_default();
        Some(Self {
            home_account_id: format!("{oid}.{tid}"),
            username,
            tenant_id: tid.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ClientInfo {
    uid: String,
    utid: String,
}

fn decode_client_info(raw: &str) -> Option<ClientInfo> {
    let bytes = URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Decode the payload segment of a JWT without validating it.
fn decode_jwt_claims(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// An ordered set of permission strings requested for a token.
///
/// Order is preserved for display; equality for cache keys uses the
/// normalized (sorted, deduplicated, lowercased) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Build a scope set preserving the given order.
    #[must_use]
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(scopes.into_iter().map(Into::into).collect())
    }

    /// Parse a space-separated scope string as returned by providers.
    #[must_use]
    pub fn from_space_separated(raw: &str) -> Self {
        Self(raw.split_whitespace().map(ToOwned::to_owned).collect())
    }

    /// The scopes in their original order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether no scopes were requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical form for cache-key equality: sorted, deduplicated,
    /// lowercased.
    #[must_use]
    pub fn normalized(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.0.iter().map(|s| s.to_lowercase()).collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }

    /// Space-separated rendering for request bodies and display.
    #[must_use]
    pub fn to_scope_string(&self) -> String {
        self.0.join(" ")
    }

    /// Derive the app-only `/.default` scope from the first configured
    /// resource scope. Client-credential grants accept exactly one
    /// resource, expressed as `{scheme}://{host}/.default`.
    #[must_use]
    pub fn to_default_resource(&self) -> Option<String> {
        let first = self.0.first()?;
        let parsed = url::Url::parse(first).ok()?;
        let host = parsed.host_str()?;
        Some(format!("{}://{}/.default", parsed.scheme(), host))
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scope_string())
    }
}

/// Uniquely identifies a cached token entry.
///
/// The account component is `None` for app-only (client-credential)
/// tokens and carries an opaque discriminator for on-behalf-of entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Authority discriminator (authority URL + client id, lowercased).
    pub authority: String,
    /// Home-account identifier, or `None` for app-only tokens.
    pub account_id: Option<String>,
    /// Normalized scope list.
    pub scopes: Vec<String>,
}

impl CacheKey {
    /// Key for a delegated (user) token.
    #[must_use]
    pub fn new(authority: &Authority, account: Option<&Account>, scopes: &ScopeSet) -> Self {
        Self {
            authority: authority.discriminator(),
            account_id: account.map(|a| a.home_account_id.clone()),
            scopes: scopes.normalized(),
        }
    }

    /// Key for an app-only token (no account component).
    #[must_use]
    pub fn app_only(authority: &Authority, scopes: &ScopeSet) -> Self {
        Self::new(authority, None, scopes)
    }

    /// Key for an on-behalf-of token, partitioned by an assertion-derived
    /// discriminator rather than a real account.
    #[must_use]
    pub fn on_behalf_of(authority: &Authority, assertion_id: &str, scopes: &ScopeSet) -> Self {
        Self {
            authority: authority.discriminator(),
            account_id: Some(format!("obo.{assertion_id}")),
            scopes: scopes.normalized(),
        }
    }
}

/// A cached access token with its refresh artifact and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// The cache key that owns this entry.
    pub key: CacheKey,
    /// The bearer access token.
    pub access_token: String,
    /// Token type; `Bearer` for everything this crate acquires.
    pub token_type: String,
    /// Absolute expiry timestamp (UTC).
    pub expires_at: DateTime<Utc>,
    /// Scopes actually granted by the provider.
    pub scopes: ScopeSet,
    /// Refresh token, when the provider issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OpenID Connect id token, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// The authenticated account, absent for app-only tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
}

impl TokenEntry {
    /// Build an entry from a provider token response.
    ///
    /// Granted scopes come from the response when the provider echoed
    /// them, otherwise the requested set is assumed granted.
    #[must_use]
    pub fn from_response(
        key: CacheKey,
        account: Option<Account>,
        requested: &ScopeSet,
        response: TokenResponse,
    ) -> Self {
        let scopes = response
            .scope
            .as_deref()
            .map(ScopeSet::from_space_separated)
            .unwrap_or_else(|| requested.clone());

        Self {
            key,
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: Utc::now() + Duration::seconds(response.expires_in.max(0)),
            scopes,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            account,
        }
    }

    /// Whether the entry is still valid under the given clock-skew
    /// tolerance: `now + skew < expires_at`.
    #[must_use]
    pub fn is_valid(&self, skew_seconds: i64) -> bool {
        Utc::now() + Duration::seconds(skew_seconds) < self.expires_at
    }

    /// Seconds until absolute expiry (negative once past).
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }

    /// Render the `Authorization` header value for downstream calls.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Token endpoint response (RFC 6749 §5.1, plus provider extensions).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The issued access token.
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OpenID Connect id token, if requested.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Token type; effectively always `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Granted scopes, space-separated, when the provider echoes them.
    #[serde(default)]
    pub scope: Option<String>,
    /// Provider account-identity blob (`{uid, utid}`, base64url).
    #[serde(default)]
    pub client_info: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Device authorization response (RFC 8628 §3.2).
///
/// Transient: exists only while a device-code flow is in progress.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeChallenge {
    /// Opaque code the client polls the token endpoint with.
    pub device_code: String,
    /// Short code the user types at the verification URL.
    pub user_code: String,
    /// Where the user completes sign-in on a second device.
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    /// Challenge lifetime in seconds.
    pub expires_in: u64,
    /// Polling interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    /// Provider-composed instruction message, when present.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_poll_interval() -> u64 {
    5
}
