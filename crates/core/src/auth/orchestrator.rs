//! The credential orchestrator.
//!
//! Owns flow selection and sequencing for a single public operation:
//! check the cache, run the configured fallback chain, consult the
//! classifier on every failure, and hand back either a token or one
//! terminal classified error. The orchestrator itself owns no persistent
//! state; everything durable lives in the token cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tokenforge_common::{retry_with_policy, ClassificationPolicy, RetryConfig};

use super::cache::TokenCache;
use super::classify::{ClassifiedError, ErrorKind, RecommendedAction};
use super::flows::{
    BrokerAssistedFlow, ClientCredentialFlow, DeviceCodeFlow, FlowExecutor, FlowKind, FlowRequest,
    FlowResult, IntegratedPlatformFlow, InteractiveBrowserFlow, SilentCacheFlow,
};
use super::ports::{DeviceCodeCallback, InteractiveSurface, PlatformBroker};
use super::provider::ProviderClient;
use super::types::{Account, Authority, CacheKey, ScopeSet};

/// Per-request acquisition states, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireState {
    Idle,
    CacheLookup,
    SilentRefresh,
    FlowInProgress,
    Authenticated,
    Failed,
}

impl std::fmt::Display for AcquireState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CacheLookup => "cache-lookup",
            Self::SilentRefresh => "silent-refresh",
            Self::FlowInProgress => "flow-in-progress",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Orchestrator tuning: the default fallback chain and network-retry
/// bounds.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Chain used when a request names no preference.
    pub default_chain: Vec<FlowKind>,
    /// Bounded backoff applied to network failures of non-interactive
    /// executors.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_chain: vec![FlowKind::SilentCache, FlowKind::InteractiveBrowser],
            retry: RetryConfig::default().with_max_attempts(3),
        }
    }
}

/// One token acquisition request.
#[derive(Clone)]
pub struct TokenRequest {
    /// The identity to authenticate against.
    pub authority: Authority,
    /// Scopes requested for the token.
    pub scopes: ScopeSet,
    /// Known account, when the caller has one.
    pub account_hint: Option<Account>,
    /// Fallback chain override; `None` uses the configured default.
    pub flow_preference: Option<Vec<FlowKind>>,
    /// Cooperative cancellation for the whole request.
    pub cancellation: CancellationToken,
}

impl TokenRequest {
    /// Request with the default chain, no account hint, and a fresh
    /// cancellation token.
    #[must_use]
    pub fn new(authority: Authority, scopes: ScopeSet) -> Self {
        Self {
            authority,
            scopes,
            account_hint: None,
            flow_preference: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Pin the request to a known account.
    #[must_use]
    pub fn with_account(mut self, account: Account) -> Self {
        self.account_hint = Some(account);
        self
    }

    /// Override the fallback chain for this request.
    #[must_use]
    pub fn with_flows(mut self, flows: Vec<FlowKind>) -> Self {
        self.flow_preference = Some(flows);
        self
    }

    /// Attach an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Builder wiring executors from whichever host capabilities exist.
pub struct OrchestratorBuilder {
    cache: Arc<TokenCache>,
    provider: Arc<dyn ProviderClient>,
    surface: Option<Arc<dyn InteractiveSurface>>,
    broker: Option<Arc<dyn PlatformBroker>>,
    device_callback: Option<DeviceCodeCallback>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Wire the host's interactive user-agent surface, enabling the
    /// interactive-browser flow.
    #[must_use]
    pub fn with_interactive(mut self, surface: Arc<dyn InteractiveSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Wire the platform broker, enabling the broker-assisted and
    /// integrated flows where the platform supports them.
    #[must_use]
    pub fn with_platform_broker(mut self, broker: Arc<dyn PlatformBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Wire the device-code surfacing callback, enabling the device-code
    /// flow.
    #[must_use]
    pub fn with_device_code(mut self, callback: DeviceCodeCallback) -> Self {
        self.device_callback = Some(callback);
        self
    }

    /// Replace the default configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Construct the orchestrator.
    ///
    /// Platform-conditional executors are resolved here: a broker that
    /// reports unavailable leaves the broker-assisted and integrated
    /// flows out of the executor set entirely, so chains never reach them
    /// at call time.
    #[must_use]
    pub fn build(self) -> CredentialOrchestrator {
        let mut executors: HashMap<FlowKind, Arc<dyn FlowExecutor>> = HashMap::new();

        executors.insert(
            FlowKind::SilentCache,
            Arc::new(SilentCacheFlow::new(self.cache.clone(), self.provider.clone())),
        );
        executors.insert(
            FlowKind::ClientCredential,
            Arc::new(ClientCredentialFlow::new(self.provider.clone())),
        );

        if let Some(callback) = self.device_callback {
            executors.insert(
                FlowKind::DeviceCode,
                Arc::new(DeviceCodeFlow::new(self.provider.clone(), callback)),
            );
        }

        let interactive = self
            .surface
            .map(|surface| Arc::new(InteractiveBrowserFlow::new(self.provider.clone(), surface)));
        if let Some(flow) = interactive.clone() {
            executors.insert(FlowKind::InteractiveBrowser, flow);
        }

        if let Some(broker) = self.broker {
            if broker.is_available() {
                executors.insert(
                    FlowKind::IntegratedPlatformCredential,
                    Arc::new(IntegratedPlatformFlow::new(broker.clone())),
                );
                match interactive {
                    Some(fallback) => {
                        executors.insert(
                            FlowKind::BrokerAssisted,
                            Arc::new(BrokerAssistedFlow::new(
                                broker,
                                self.cache.clone(),
                                fallback,
                            )),
                        );
                    }
                    None => {
                        warn!("platform broker wired without an interactive surface; broker-assisted flow excluded");
                    }
                }
            } else {
                info!("platform broker unavailable; broker flows excluded from selection");
            }
        }

        CredentialOrchestrator {
            cache: self.cache,
            executors,
            config: self.config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

/// The state machine that selects and sequences flow executors.
pub struct CredentialOrchestrator {
    cache: Arc<TokenCache>,
    executors: HashMap<FlowKind, Arc<dyn FlowExecutor>>,
    config: OrchestratorConfig,
    in_flight: Mutex<HashMap<String, broadcast::Sender<FlowResult>>>,
}

impl CredentialOrchestrator {
    /// Start building an orchestrator over a cache and provider.
    #[must_use]
    pub fn builder(
        cache: Arc<TokenCache>,
        provider: Arc<dyn ProviderClient>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            cache,
            provider,
            surface: None,
            broker: None,
            device_callback: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Acquire a token for the request.
    ///
    /// Runs the fallback chain, escalating per the classifier's
    /// recommended action, until an executor succeeds or the chain is
    /// exhausted. Returns exactly one terminal result.
    pub async fn acquire_token(&self, request: &TokenRequest) -> FlowResult {
        let request_id = Uuid::new_v4();
        let mut state = AcquireState::Idle;

        let chain = self.resolve_chain(request)?;
        info!(
            %request_id,
            authority = %request.authority.authority_url(),
            chain = ?chain.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "token acquisition started"
        );

        let account = self.resolve_account(request).await;
        let flow_request = FlowRequest {
            authority: request.authority.clone(),
            scopes: request.scopes.clone(),
            account_hint: account.clone(),
            cancellation: request.cancellation.clone(),
        };
        let discard_key =
            CacheKey::new(&request.authority, account.as_ref(), &request.scopes);

        let mut last_error: Option<ClassifiedError> = None;

        for kind in &chain {
            if request.cancellation.is_cancelled() {
                self.transition(request_id, &mut state, AcquireState::Failed);
                return Err(ClassifiedError::cancelled("token acquisition cancelled"));
            }

            let next_state = match kind {
                FlowKind::SilentCache => AcquireState::CacheLookup,
                _ => AcquireState::FlowInProgress,
            };
            self.transition(request_id, &mut state, next_state);

            let executor = self.executors[kind].clone();
            let (result, joined) = if kind.is_interactive() {
                self.run_single_flight(*kind, executor.as_ref(), &flow_request).await
            } else {
                (self.run_with_retry(*kind, executor.as_ref(), &flow_request).await, false)
            };

            match result {
                Ok(entry) => {
                    // The silent executor writes its own refresh results;
                    // a joiner's owner already wrote the shared one.
                    if *kind != FlowKind::SilentCache && !joined {
                        if let Err(e) = self.cache.put(entry.clone()).await {
                            warn!(%request_id, error = %e, "token acquired but cache write failed");
                        }
                    }
                    self.transition(request_id, &mut state, AcquireState::Authenticated);
                    info!(%request_id, flow = %kind, "token acquisition succeeded");
                    return Ok(entry);
                }
                Err(error) if joined => {
                    // The in-flight flow we attached to failed; its result
                    // is ours, with no second prompt.
                    self.transition(request_id, &mut state, AcquireState::Failed);
                    return Err(error);
                }
                Err(error) => {
                    debug!(%request_id, flow = %kind, kind = %error.kind(), "flow attempt failed");
                    match error.action() {
                        RecommendedAction::Escalate => {
                            if *kind == FlowKind::SilentCache {
                                self.transition(
                                    request_id,
                                    &mut state,
                                    AcquireState::SilentRefresh,
                                );
                            }
                            last_error = Some(error);
                        }
                        RecommendedAction::DiscardCacheAndEscalate => {
                            if let Err(e) = self.cache.remove(&discard_key).await {
                                warn!(%request_id, error = %e, "failed to discard invalid cache entry");
                            }
                            last_error = Some(error);
                        }
                        RecommendedAction::RetryWithBackoff => {
                            // Retries already ran inside the executor step;
                            // exhaustion terminates the request.
                            self.transition(request_id, &mut state, AcquireState::Failed);
                            return Err(error);
                        }
                        RecommendedAction::Fatal | RecommendedAction::Terminate => {
                            self.transition(request_id, &mut state, AcquireState::Failed);
                            return Err(error);
                        }
                    }
                }
            }
        }

        self.transition(request_id, &mut state, AcquireState::Failed);
        let error = last_error.unwrap_or_else(|| {
            ClassifiedError::new(ErrorKind::Unknown, "fallback chain exhausted without a result")
        });
        info!(%request_id, kind = %error.kind(), "token acquisition failed");
        Err(error)
    }

    /// Remove every cached entry for the account (sign-out).
    pub async fn sign_out(&self, account: &Account) -> Result<(), ClassifiedError> {
        self.cache
            .invalidate(account)
            .await
            .map_err(|e| ClassifiedError::new(ErrorKind::Unknown, e.to_string()))
    }

    /// Accounts with cached entries for the authority.
    pub async fn accounts(&self, authority: &Authority) -> Result<Vec<Account>, ClassifiedError> {
        self.cache
            .list_accounts(authority)
            .await
            .map_err(|e| ClassifiedError::new(ErrorKind::Unknown, e.to_string()))
    }

    fn transition(&self, request_id: Uuid, state: &mut AcquireState, next: AcquireState) {
        if *state != next {
            debug!(%request_id, from = %state, to = %next, "acquisition state transition");
            *state = next;
        }
    }

    /// Validate and materialize the chain for a request.
    ///
    /// Broker-assisted entries are stripped when the platform left the
    /// executor unregistered; any other unregistered flow is a
    /// configuration error surfaced before side effects.
    fn resolve_chain(&self, request: &TokenRequest) -> Result<Vec<FlowKind>, ClassifiedError> {
        let requested = request
            .flow_preference
            .clone()
            .unwrap_or_else(|| self.config.default_chain.clone());

        let mut chain = Vec::with_capacity(requested.len());
        for kind in requested {
            if self.executors.contains_key(&kind) {
                chain.push(kind);
            } else if kind == FlowKind::BrokerAssisted {
                debug!("broker-assisted flow unsupported on this platform; skipping chain entry");
            } else {
                return Err(ClassifiedError::new(
                    ErrorKind::ClientMisconfigured,
                    format!("flow {kind} is not configured on this orchestrator"),
                ));
            }
        }

        if chain.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::ClientMisconfigured,
                "fallback chain is empty after platform capability resolution",
            ));
        }
        Ok(chain)
    }

    async fn resolve_account(&self, request: &TokenRequest) -> Option<Account> {
        if let Some(account) = request.account_hint.clone() {
            return Some(account);
        }
        match self.cache.list_accounts(&request.authority).await {
            Ok(accounts) => accounts.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "account lookup failed; continuing without hint");
                None
            }
        }
    }

    async fn run_with_retry(
        &self,
        kind: FlowKind,
        executor: &dyn FlowExecutor,
        request: &FlowRequest,
    ) -> FlowResult {
        let result =
            retry_with_policy(&self.config.retry, &ClassificationPolicy, || {
                executor.execute(request)
            })
            .await;

        result.map_err(|retry_error| {
            let error = retry_error.into_source();
            debug!(flow = %kind, kind = %error.kind(), "executor settled with error");
            error
        })
    }

    /// Run a prompting executor with at most one in-flight instance per
    /// (authority, account) pair. Concurrent identical requests attach to
    /// the in-flight flow and receive its result; a second prompt is never
    /// issued.
    async fn run_single_flight(
        &self,
        kind: FlowKind,
        executor: &dyn FlowExecutor,
        request: &FlowRequest,
    ) -> (FlowResult, bool) {
        let flight_key = format!(
            "{}|{}",
            request.authority.discriminator(),
            request
                .account_hint
                .as_ref()
                .map(|a| a.home_account_id.as_str())
                .unwrap_or("-")
        );

        let mut in_flight = self.in_flight.lock().await;
        if let Some(sender) = in_flight.get(&flight_key) {
            let mut receiver = sender.subscribe();
            drop(in_flight);

            debug!(flow = %kind, "attaching to in-flight interactive flow");
            let result = match receiver.recv().await {
                Ok(result) => result,
                Err(_) => Err(ClassifiedError::new(
                    ErrorKind::Unknown,
                    "in-flight interactive flow terminated without a result",
                )),
            };
            return (result, true);
        }

        let (sender, _keepalive) = broadcast::channel(8);
        in_flight.insert(flight_key.clone(), sender.clone());
        drop(in_flight);

        let result = executor.execute(request).await;

        let mut in_flight = self.in_flight.lock().await;
        in_flight.remove(&flight_key);
        let _ = sender.send(result.clone());
        drop(in_flight);

        (result, false)
    }
}
