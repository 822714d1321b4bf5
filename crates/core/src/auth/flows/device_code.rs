//! Device-code flow: out-of-band sign-in on a second device.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use super::{FlowExecutor, FlowKind, FlowRequest, FlowResult};
use crate::auth::classify::{classify, ClassifiedError, ErrorKind};
use crate::auth::ports::DeviceCodeCallback;
use crate::auth::provider::{DeviceCodePoll, ProviderClient};
use crate::auth::types::{Account, CacheKey, TokenEntry};

/// Seconds added to the polling interval on a slow-down response.
const SLOW_DOWN_BACKOFF_SECS: u64 = 5;

/// Requests a device-code challenge, surfaces it once through the
/// callback, then polls the token endpoint until the user completes
/// sign-in, explicitly declines, or the challenge expires.
///
/// Cancellation aborts the poll loop at the next suspension point.
pub struct DeviceCodeFlow {
    provider: Arc<dyn ProviderClient>,
    callback: DeviceCodeCallback,
}

impl DeviceCodeFlow {
    /// Create a device-code executor surfacing challenges through
    /// `callback`.
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderClient>, callback: DeviceCodeCallback) -> Self {
        Self { provider, callback }
    }
}

#[async_trait]
impl FlowExecutor for DeviceCodeFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::DeviceCode
    }

    async fn execute(&self, request: &FlowRequest) -> FlowResult {
        let challenge = self
            .provider
            .request_device_code(&request.authority, &request.scopes)
            .await
            .map_err(|raw| classify(&raw))?;

        info!(
            user_code = %challenge.user_code,
            expires_in = challenge.expires_in,
            "device code challenge issued"
        );

        // Surfaced exactly once, before polling begins.
        (self.callback)(&challenge);

        let deadline = Instant::now() + Duration::from_secs(challenge.expires_in);
        let mut interval = Duration::from_secs(challenge.interval.max(1));

        loop {
            if request.cancellation.is_cancelled() {
                return Err(ClassifiedError::cancelled("device code flow cancelled"));
            }

            tokio::select! {
                () = request.cancellation.cancelled() => {
                    return Err(ClassifiedError::cancelled("device code flow cancelled"));
                }
                () = sleep(interval) => {}
            }

            if Instant::now() >= deadline {
                return Err(ClassifiedError::new(
                    ErrorKind::InvalidGrant,
                    "device code challenge expired before the user completed sign-in",
                ));
            }

            match self.provider.poll_device_code(&request.authority, &challenge.device_code).await
            {
                Ok(DeviceCodePoll::Issued(response)) => {
                    debug!("device code flow completed");
                    let account = Account::from_token_response(&response)
                        .or_else(|| request.account_hint.clone());
                    let key =
                        CacheKey::new(&request.authority, account.as_ref(), &request.scopes);
                    return Ok(TokenEntry::from_response(
                        key,
                        account,
                        &request.scopes,
                        response,
                    ));
                }
                Ok(DeviceCodePoll::AuthorizationPending) => {}
                Ok(DeviceCodePoll::SlowDown) => {
                    interval += Duration::from_secs(SLOW_DOWN_BACKOFF_SECS);
                    debug!(interval_secs = interval.as_secs(), "provider asked to slow polling");
                }
                Err(raw) => return Err(classify(&raw)),
            }
        }
    }
}
