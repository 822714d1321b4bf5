//! Token acquisition orchestration.
//!
//! This module implements the full acquisition pipeline: a persistent token
//! cache shared across processes, a closed provider-error taxonomy with a
//! recommended action per kind, one executor per authentication flow, and
//! the orchestrator that sequences them behind a single public operation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐
//! │ CredentialOrchestrator │  acquire_token / sign_out / accounts
//! └───────────┬────────────┘
//!             │
//!             ├──► TokenCache ───────► SecretStore   (platform keychain)
//!             ├──► FlowExecutors ────► ProviderClient (token endpoints)
//!             │         │
//!             │         ├──► InteractiveSurface  (host user agent)
//!             │         └──► PlatformBroker      (OS authentication)
//!             └──► classify()         (escalation policy)
//!
//! ┌─────────────────────┐
//! │ OnBehalfOfExchanger │  confidential delegation, shares the cache
//! └─────────────────────┘
//! ```
//!
//! Callers receive either a valid [`types::TokenEntry`] or a single
//! terminal [`classify::ClassifiedError`]; raw provider errors never cross
//! the flow-executor boundary.
//!
//! # Module Organization
//!
//! - [`types`]: authorities, accounts, scopes, cache keys, token entries
//! - [`classify`]: the error taxonomy and the `classify` mapping
//! - [`cache`]: the persistent token cache over a secret store
//! - [`provider`]: the identity-provider port and its HTTP implementation
//! - [`pkce`]: PKCE challenge generation for the interactive flow
//! - [`ports`]: host capability ports (user agent, platform broker)
//! - [`flows`]: one executor per authentication flow
//! - [`orchestrator`]: flow selection, escalation, single-flight dedup
//! - [`obo`]: on-behalf-of exchange for confidential callers

pub mod cache;
pub mod classify;
pub mod flows;
pub mod obo;
pub mod orchestrator;
pub mod pkce;
pub mod ports;
pub mod provider;
pub mod types;
