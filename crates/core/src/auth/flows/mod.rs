//! Flow executors: one per authentication flow.
//!
//! Each executor performs a single externally-visible authentication
//! attempt and returns a classified result. Executors never decide
//! escalation (that is the classifier's recommendation and the
//! orchestrator's decision) and never prompt beyond the single
//! interaction their flow defines.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::classify::ClassifiedError;
use super::types::{Account, Authority, ScopeSet, TokenEntry};

pub mod broker;
pub mod client_credential;
pub mod device_code;
pub mod integrated;
pub mod interactive;
pub mod silent;

pub use broker::BrokerAssistedFlow;
pub use client_credential::ClientCredentialFlow;
pub use device_code::DeviceCodeFlow;
pub use integrated::IntegratedPlatformFlow;
pub use interactive::InteractiveBrowserFlow;
pub use silent::SilentCacheFlow;

/// Result of a completed flow attempt: a cached-and-usable token entry or
/// a classified error, never both.
pub type FlowResult = Result<TokenEntry, ClassifiedError>;

/// Names each executor for policy chains and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Cache lookup plus silent refresh; never prompts.
    SilentCache,
    /// Out-of-band sign-in on a second device.
    DeviceCode,
    /// External user-agent authorization round trip.
    InteractiveBrowser,
    /// Non-interactive OS-logged-in identity.
    IntegratedPlatformCredential,
    /// OS broker-mediated acquisition.
    BrokerAssisted,
    /// App-only token from the authority's own credential.
    ClientCredential,
}

impl FlowKind {
    /// Whether this flow may surface a user prompt and therefore falls
    /// under the single-prompt exclusivity guarantee.
    #[must_use]
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::DeviceCode | Self::InteractiveBrowser | Self::BrokerAssisted)
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SilentCache => "silent-cache",
            Self::DeviceCode => "device-code",
            Self::InteractiveBrowser => "interactive-browser",
            Self::IntegratedPlatformCredential => "integrated-platform-credential",
            Self::BrokerAssisted => "broker-assisted",
            Self::ClientCredential => "client-credential",
        };
        write!(f, "{name}")
    }
}

/// Everything an executor needs for one attempt.
#[derive(Clone)]
pub struct FlowRequest {
    /// The identity to authenticate against.
    pub authority: Authority,
    /// Scopes requested for the token.
    pub scopes: ScopeSet,
    /// Known account to authenticate, when the caller has one.
    pub account_hint: Option<Account>,
    /// Cooperative cancellation for the whole attempt.
    pub cancellation: CancellationToken,
}

impl FlowRequest {
    /// Build a request with no account hint and a fresh cancellation
    /// token.
    #[must_use]
    pub fn new(authority: Authority, scopes: ScopeSet) -> Self {
        Self { authority, scopes, account_hint: None, cancellation: CancellationToken::new() }
    }
}

/// A single externally-visible authentication attempt.
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Which flow this executor implements.
    fn kind(&self) -> FlowKind;

    /// Execute one attempt. Raw provider errors must be classified before
    /// they leave this call.
    async fn execute(&self, request: &FlowRequest) -> FlowResult;
}
