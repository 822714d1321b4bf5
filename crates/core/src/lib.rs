//! # Tokenforge Core
//!
//! Token acquisition orchestration for OAuth2/OIDC identity providers.
//!
//! This crate contains:
//! - The [`auth`] module: token cache, provider-error classification, flow
//!   executors, the credential orchestrator, and the on-behalf-of exchanger
//! - Port traits for everything external: the identity provider, the
//!   interactive user-agent surface, the platform authentication broker,
//!   and (via `tokenforge-common`) persistent secret storage
//!
//! ## Architecture Principles
//! - Only depends on `tokenforge-common`
//! - No UI, no HTTP server, no platform lookups; all host capabilities
//!   arrive through traits
//! - Every failure is a typed, classified result; nothing panics across
//!   the public boundary

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;

// Testing utilities
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::cache::{CacheError, TokenCache};
pub use auth::classify::{classify, ClassifiedError, ErrorKind, RecommendedAction};
pub use auth::flows::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
pub use auth::obo::OnBehalfOfExchanger;
pub use auth::orchestrator::{
    CredentialOrchestrator, OrchestratorBuilder, OrchestratorConfig, TokenRequest,
};
pub use auth::ports::{
    AuthorizationCode, DeviceCodeCallback, InteractiveSurface, PlatformBroker,
};
pub use auth::provider::{DeviceCodePoll, HttpProviderClient, ProviderClient, RawProviderError};
pub use auth::types::{
    Account, Authority, CacheKey, DeviceCodeChallenge, ScopeSet, TokenEntry, TokenResponse,
};
