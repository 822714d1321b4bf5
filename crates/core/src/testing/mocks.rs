//! Scripted mock implementations of the provider and host ports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::auth::ports::{AuthorizationCode, InteractiveSurface, PlatformBroker};
use crate::auth::provider::{DeviceCodePoll, ProviderClient, RawProviderError};
use crate::auth::types::{
    Account, Authority, DeviceCodeChallenge, ScopeSet, TokenResponse,
};

type ScriptedResponse = Mutex<Option<Result<TokenResponse, RawProviderError>>>;

fn unscripted() -> RawProviderError {
    RawProviderError::protocol("invalid_request", "no scripted response")
}

fn take_scripted(slot: &ScriptedResponse) -> Result<TokenResponse, RawProviderError> {
    // SAFETY: mutex poisoning is acceptable in test mocks
    slot.lock().unwrap().clone().unwrap_or_else(|| Err(unscripted()))
}

/// Scripted identity provider that records call counts per grant type.
///
/// Clones share state, so a test can keep one handle and give another to
/// the code under test.
#[derive(Clone, Default)]
pub struct MockProviderClient {
    refresh_result: Arc<ScriptedResponse>,
    device_challenge: Arc<Mutex<Option<Result<DeviceCodeChallenge, RawProviderError>>>>,
    poll_script: Arc<Mutex<VecDeque<Result<DeviceCodePoll, RawProviderError>>>>,
    auth_code_result: Arc<ScriptedResponse>,
    client_credential_result: Arc<ScriptedResponse>,
    obo_result: Arc<ScriptedResponse>,
    last_client_credential_scope: Arc<Mutex<Option<String>>>,
    last_obo_assertion: Arc<Mutex<Option<String>>>,
    refresh_calls: Arc<AtomicUsize>,
    device_code_requests: Arc<AtomicUsize>,
    poll_count: Arc<AtomicUsize>,
    auth_code_count: Arc<AtomicUsize>,
    client_credential_count: Arc<AtomicUsize>,
    obo_count: Arc<AtomicUsize>,
}

impl MockProviderClient {
    /// Create a mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the refresh-token grant result.
    pub fn set_refresh_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.refresh_result.lock().unwrap() = Some(result);
    }

    /// Script the device authorization response.
    pub fn set_device_challenge(&self, result: Result<DeviceCodeChallenge, RawProviderError>) {
        *self.device_challenge.lock().unwrap() = Some(result);
    }

    /// Queue one device-code poll outcome; polls consume the queue in
    /// order and report pending once it drains.
    pub fn push_poll_result(&self, result: Result<DeviceCodePoll, RawProviderError>) {
        self.poll_script.lock().unwrap().push_back(result);
    }

    /// Script the authorization-code grant result.
    pub fn set_auth_code_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.auth_code_result.lock().unwrap() = Some(result);
    }

    /// Script the client-credentials grant result.
    pub fn set_client_credential_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.client_credential_result.lock().unwrap() = Some(result);
    }

    /// Script the on-behalf-of grant result.
    pub fn set_obo_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.obo_result.lock().unwrap() = Some(result);
    }

    /// Number of refresh-token grants attempted.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of device authorization requests.
    #[must_use]
    pub fn device_code_requests(&self) -> usize {
        self.device_code_requests.load(Ordering::SeqCst)
    }

    /// Number of device-code polls.
    #[must_use]
    pub fn poll_calls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    /// Number of authorization-code redemptions.
    #[must_use]
    pub fn auth_code_calls(&self) -> usize {
        self.auth_code_count.load(Ordering::SeqCst)
    }

    /// Number of client-credentials grants.
    #[must_use]
    pub fn client_credential_calls(&self) -> usize {
        self.client_credential_count.load(Ordering::SeqCst)
    }

    /// Number of on-behalf-of exchanges.
    #[must_use]
    pub fn obo_calls(&self) -> usize {
        self.obo_count.load(Ordering::SeqCst)
    }

    /// The scope string sent with the last client-credentials grant.
    #[must_use]
    pub fn last_client_credential_scope(&self) -> Option<String> {
        self.last_client_credential_scope.lock().unwrap().clone()
    }

    /// The assertion sent with the last on-behalf-of exchange.
    #[must_use]
    pub fn last_obo_assertion(&self) -> Option<String> {
        self.last_obo_assertion.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn redeem_refresh_token(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
        _refresh_token: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        take_scripted(&self.refresh_result)
    }

    async fn request_device_code(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
    ) -> Result<DeviceCodeChallenge, RawProviderError> {
        self.device_code_requests.fetch_add(1, Ordering::SeqCst);
        self.device_challenge.lock().unwrap().clone().unwrap_or_else(|| Err(unscripted()))
    }

    async fn poll_device_code(
        &self,
        _authority: &Authority,
        _device_code: &str,
    ) -> Result<DeviceCodePoll, RawProviderError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(DeviceCodePoll::AuthorizationPending))
    }

    async fn redeem_authorization_code(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
        _code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        self.auth_code_count.fetch_add(1, Ordering::SeqCst);
        take_scripted(&self.auth_code_result)
    }

    async fn client_credentials(
        &self,
        _authority: &Authority,
        resource_scope: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        self.client_credential_count.fetch_add(1, Ordering::SeqCst);
        *self.last_client_credential_scope.lock().unwrap() = Some(resource_scope.to_string());
        take_scripted(&self.client_credential_result)
    }

    async fn on_behalf_of(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
        assertion: &str,
    ) -> Result<TokenResponse, RawProviderError> {
        self.obo_count.fetch_add(1, Ordering::SeqCst);
        *self.last_obo_assertion.lock().unwrap() = Some(assertion.to_string());
        take_scripted(&self.obo_result)
    }
}

/// Scripted user-agent surface.
///
/// By default echoes the `state` parameter it finds in the authorization
/// URL, the way a real provider redirect would; tests can force a
/// mismatched state or a scripted failure instead.
pub struct MockInteractiveSurface {
    redirect_uri: String,
    code: Mutex<Option<String>>,
    forced_state: Mutex<Option<String>>,
    result_override: Mutex<Option<Result<AuthorizationCode, RawProviderError>>>,
    block_until_cancelled: AtomicBool,
    delay: Mutex<Option<std::time::Duration>>,
    last_url: Mutex<Option<String>>,
    authorize_count: AtomicUsize,
}

impl MockInteractiveSurface {
    /// Create a surface listening on the given redirect URI.
    #[must_use]
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            code: Mutex::new(None),
            forced_state: Mutex::new(None),
            result_override: Mutex::new(None),
            block_until_cancelled: AtomicBool::new(false),
            delay: Mutex::new(None),
            last_url: Mutex::new(None),
            authorize_count: AtomicUsize::new(0),
        }
    }

    /// Hold the authorization open for `delay` before completing, to give
    /// concurrent requests a window to attach.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Script the authorization code the surface hands back.
    pub fn set_code(&self, code: impl Into<String>) {
        *self.code.lock().unwrap() = Some(code.into());
    }

    /// Force a specific echoed state instead of the one in the URL.
    pub fn force_state(&self, state: impl Into<String>) {
        *self.forced_state.lock().unwrap() = Some(state.into());
    }

    /// Script a full result, overriding code/state handling.
    pub fn set_result(&self, result: Result<AuthorizationCode, RawProviderError>) {
        *self.result_override.lock().unwrap() = Some(result);
    }

    /// Make `authorize` block until the cancellation token fires.
    pub fn set_block_until_cancelled(&self) {
        self.block_until_cancelled.store(true, Ordering::SeqCst);
    }

    /// The last authorization URL the surface was asked to open.
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }

    /// Number of authorization round trips requested.
    #[must_use]
    pub fn authorize_calls(&self) -> usize {
        self.authorize_count.load(Ordering::SeqCst)
    }

    fn state_from_url(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    }
}

#[async_trait]
impl InteractiveSurface for MockInteractiveSurface {
    fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    async fn authorize(
        &self,
        authorize_url: &str,
        cancellation: &CancellationToken,
    ) -> Result<AuthorizationCode, RawProviderError> {
        self.authorize_count.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(authorize_url.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.block_until_cancelled.load(Ordering::SeqCst) {
            cancellation.cancelled().await;
            return Err(RawProviderError::protocol(
                "access_denied",
                "authorization cancelled",
            ));
        }

        if let Some(result) = self.result_override.lock().unwrap().clone() {
            return result;
        }

        let code = self
            .code
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RawProviderError::protocol("access_denied", "no scripted code"))?;

        let state = self
            .forced_state
            .lock()
            .unwrap()
            .clone()
            .or_else(|| Self::state_from_url(authorize_url))
            .unwrap_or_default();

        Ok(AuthorizationCode { code, state })
    }
}

/// Scripted platform broker with configurable capability flags.
pub struct MockPlatformBroker {
    available: bool,
    integrated_supported: bool,
    silent_result: ScriptedResponse,
    integrated_result: ScriptedResponse,
    silent_count: AtomicUsize,
    integrated_count: AtomicUsize,
}

impl Default for MockPlatformBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatformBroker {
    /// Create an available broker with integrated support.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: true,
            integrated_supported: true,
            silent_result: Mutex::new(None),
            integrated_result: Mutex::new(None),
            silent_count: AtomicUsize::new(0),
            integrated_count: AtomicUsize::new(0),
        }
    }

    /// Override broker availability.
    #[must_use]
    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Override integrated-auth support.
    #[must_use]
    pub fn with_integrated_support(mut self, supported: bool) -> Self {
        self.integrated_supported = supported;
        self
    }

    /// Script the silent broker acquisition result.
    pub fn set_silent_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.silent_result.lock().unwrap() = Some(result);
    }

    /// Script the integrated acquisition result.
    pub fn set_integrated_result(&self, result: Result<TokenResponse, RawProviderError>) {
        *self.integrated_result.lock().unwrap() = Some(result);
    }

    /// Number of silent broker acquisitions.
    #[must_use]
    pub fn silent_calls(&self) -> usize {
        self.silent_count.load(Ordering::SeqCst)
    }

    /// Number of integrated acquisitions.
    #[must_use]
    pub fn integrated_calls(&self) -> usize {
        self.integrated_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformBroker for MockPlatformBroker {
    fn is_available(&self) -> bool {
        self.available
    }

    fn supports_integrated_auth(&self) -> bool {
        self.integrated_supported
    }

    async fn acquire_silent(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
        _account: &Account,
    ) -> Result<TokenResponse, RawProviderError> {
        self.silent_count.fetch_add(1, Ordering::SeqCst);
        take_scripted(&self.silent_result)
    }

    async fn acquire_integrated(
        &self,
        _authority: &Authority,
        _scopes: &ScopeSet,
        _username: Option<&str>,
    ) -> Result<TokenResponse, RawProviderError> {
        self.integrated_count.fetch_add(1, Ordering::SeqCst);
        take_scripted(&self.integrated_result)
    }
}
