//! Host capability ports.
//!
//! The core never opens browsers, walks window ancestry, or talks to OS
//! authentication components itself. Hosts that have those capabilities
//! implement these traits and hand them to the orchestrator at
//! construction time.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::provider::RawProviderError;
use super::types::{Account, Authority, DeviceCodeChallenge, ScopeSet, TokenResponse};

/// Callback invoked exactly once per device-code flow, before polling
/// begins. The consumer is responsible for display only.
pub type DeviceCodeCallback = std::sync::Arc<dyn Fn(&DeviceCodeChallenge) + Send + Sync>;

/// The authorization code handed back by a completed user-agent round
/// trip, together with the state echoed by the provider.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// The single-use authorization code.
    pub code: String,
    /// The `state` parameter from the redirect, validated by the flow.
    pub state: String,
}

/// An external user agent capable of driving a browser-based
/// authorization round trip.
///
/// The host owns every windowing concern: which browser, which parent
/// window, how the redirect is captured. The flow hands over a fully
/// formed authorization URL and waits for the redeemed code.
#[async_trait]
pub trait InteractiveSurface: Send + Sync {
    /// The redirect URI this surface listens on.
    fn redirect_uri(&self) -> &str;

    /// Drive the user agent through `authorize_url` and return the code
    /// from the completed redirect. Implementations should return promptly
    /// once `cancellation` fires.
    async fn authorize(
        &self,
        authorize_url: &str,
        cancellation: &CancellationToken,
    ) -> Result<AuthorizationCode, RawProviderError>;
}

/// An OS-level component that can authenticate on behalf of the
/// application.
///
/// Availability is a platform capability resolved at orchestrator
/// construction; unsupported platforms never see the broker-assisted
/// executor in a fallback chain.
#[async_trait]
pub trait PlatformBroker: Send + Sync {
    /// Whether the broker component is present on this platform.
    fn is_available(&self) -> bool;

    /// Whether the OS-logged-in identity can be used non-interactively.
    fn supports_integrated_auth(&self) -> bool;

    /// Silent broker-mediated acquisition for a known account.
    async fn acquire_silent(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        account: &Account,
    ) -> Result<TokenResponse, RawProviderError>;

    /// Non-interactive acquisition using the current OS-logged-in
    /// identity, optionally pinned to a username.
    async fn acquire_integrated(
        &self,
        authority: &Authority,
        scopes: &ScopeSet,
        username: Option<&str>,
    ) -> Result<TokenResponse, RawProviderError>;
}
