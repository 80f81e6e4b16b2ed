//! OAuth 2.0 device authorization grant against the `organizations` authority.
//!
//! ```text
//! REQUESTING -> PENDING -> SUCCEEDED | DENIED | EXPIRED | FAILED
//! ```
//!
//! Polling runs on a spawned task. Its state is observable through a `watch`
//! channel and its single terminal result is handed back over a `oneshot`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::client::form_body;
use crate::config::{Endpoints, TokenmanConfig};
use crate::errors::{Result, TokenmanError};
use crate::models::{DeviceCodeResponse, ProviderErrorResponse, TokenResponse};

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

const AUTHORIZATION_PENDING: &str = "authorization_pending";
const EXPIRED_TOKEN: &str = "expired_token";
const DENIAL_CODES: &[&str] = &["authorization_declined", "access_denied", "bad_verification_code"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodeState {
    Requesting,
    Pending,
    Succeeded,
    Denied,
    Expired,
    Failed,
}

impl DeviceCodeState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Requesting | Self::Pending)
    }
}

/// A device code issued by the provider, consumed once by the poll loop
#[derive(Debug, Clone)]
pub struct DeviceCodeSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub message: Option<String>,
    /// Wall-clock expiry, for display
    pub expires_at: DateTime<Utc>,
    /// Monotonic deadline the poll loop enforces
    pub deadline: Instant,
    pub interval: Duration,
}

impl DeviceCodeSession {
    pub fn new(
        device_code: impl Into<String>,
        user_code: impl Into<String>,
        verification_uri: impl Into<String>,
        expires_in: Duration,
        interval: Duration,
    ) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::zero());
        Self {
            device_code: device_code.into(),
            user_code: user_code.into(),
            verification_uri: verification_uri.into(),
            message: None,
            expires_at,
            deadline: Instant::now() + expires_in,
            interval,
        }
    }

    fn from_response(response: DeviceCodeResponse) -> Self {
        let mut session = Self::new(
            response.device_code,
            response.user_code,
            response.verification_uri,
            Duration::from_secs(response.expires_in),
            Duration::from_secs(response.interval),
        );
        session.message = response.message;
        session
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Device code request and polling
#[derive(Debug, Clone)]
pub struct DeviceCodeFlow {
    http: Client,
    endpoints: Endpoints,
}

impl DeviceCodeFlow {
    pub fn new(config: &TokenmanConfig) -> Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Request a new device code for `client_id`
    #[instrument(skip(self))]
    pub async fn request_code(&self, client_id: &str, scope: &str) -> Result<DeviceCodeSession> {
        debug!("Requesting device code");
        let response = self
            .http
            .post(&self.endpoints.device_code)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(&[("client_id", client_id), ("scope", scope)]))
            .send()
            .await
            .map_err(|e| {
                error!("Device code request failed: {}", e);
                TokenmanError::DeviceCode {
                    status: None,
                    body_snippet: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TokenmanError::DeviceCode {
            status: Some(status),
            body_snippet: e.to_string(),
        })?;
        let snippet = || body.chars().take(200).collect::<String>();

        if status != StatusCode::OK {
            error!("Invalid device code response: {}", body);
            return Err(TokenmanError::DeviceCode {
                status: Some(status),
                body_snippet: snippet(),
            });
        }

        let device_code: DeviceCodeResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Unreadable device code response: {}", e);
            TokenmanError::DeviceCode {
                status: Some(status),
                body_snippet: snippet(),
            }
        })?;
        debug!(
            "Device code issued (user code: {}, expires in {}s, interval {}s)",
            device_code.user_code, device_code.expires_in, device_code.interval
        );
        Ok(DeviceCodeSession::from_response(device_code))
    }

    /// Request a device code and start polling for it in the background.
    ///
    /// `states` sees `Requesting` before the request is sent, `Failed` if the
    /// request fails, and every poll transition after that.
    pub async fn begin(
        &self,
        client_id: &str,
        scope: &str,
        states: watch::Sender<DeviceCodeState>,
    ) -> Result<(DeviceCodeSession, PollHandle)> {
        states.send_replace(DeviceCodeState::Requesting);
        let session = match self.request_code(client_id, scope).await {
            Ok(session) => session,
            Err(e) => {
                states.send_replace(DeviceCodeState::Failed);
                return Err(e);
            }
        };

        let handle = self.spawn_poll_with(session.clone(), client_id, scope, states);
        Ok((session, handle))
    }

    /// Poll the token endpoint until the user authenticates, the provider
    /// refuses, or the code expires
    pub async fn poll(
        &self,
        session: &DeviceCodeSession,
        client_id: &str,
        scope: &str,
    ) -> Result<TokenResponse> {
        let (state, _) = watch::channel(DeviceCodeState::Pending);
        self.poll_reporting(session, client_id, scope, &state).await
    }

    /// Run [`poll`](Self::poll) on a background task
    pub fn spawn_poll(
        &self,
        session: DeviceCodeSession,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> PollHandle {
        let (state_tx, _) = watch::channel(DeviceCodeState::Pending);
        self.spawn_poll_with(session, client_id, scope, state_tx)
    }

    fn spawn_poll_with(
        &self,
        session: DeviceCodeSession,
        client_id: impl Into<String>,
        scope: impl Into<String>,
        state_tx: watch::Sender<DeviceCodeState>,
    ) -> PollHandle {
        let (result_tx, result_rx) = oneshot::channel();
        let state_rx = state_tx.subscribe();
        let flow = self.clone();
        let client_id = client_id.into();
        let scope = scope.into();

        tokio::spawn(async move {
            let result = flow
                .poll_reporting(&session, &client_id, &scope, &state_tx)
                .await;
            // The receiver may already be gone if the caller stopped waiting
            let _ = result_tx.send(result);
        });

        PollHandle {
            result: result_rx,
            state: state_rx,
        }
    }

    #[instrument(skip_all)]
    async fn poll_reporting(
        &self,
        session: &DeviceCodeSession,
        client_id: &str,
        scope: &str,
        state: &watch::Sender<DeviceCodeState>,
    ) -> Result<TokenResponse> {
        let result = self.poll_loop(session, client_id, scope, state).await;
        let terminal = match &result {
            Ok(_) => DeviceCodeState::Succeeded,
            Err(TokenmanError::Denied { .. }) => DeviceCodeState::Denied,
            Err(TokenmanError::Expired) => DeviceCodeState::Expired,
            Err(_) => DeviceCodeState::Failed,
        };
        debug!("Device code poll finished: {:?}", terminal);
        state.send_replace(terminal);
        result
    }

    async fn poll_loop(
        &self,
        session: &DeviceCodeSession,
        client_id: &str,
        scope: &str,
        state: &watch::Sender<DeviceCodeState>,
    ) -> Result<TokenResponse> {
        let body = form_body(&[
            ("grant_type", DEVICE_CODE_GRANT),
            ("code", session.device_code.as_str()),
            ("client_id", client_id),
            ("scope", scope),
        ]);
        state.send_replace(DeviceCodeState::Pending);

        loop {
            debug!("Polling for device code authentication");
            let response = self
                .http
                .post(&self.endpoints.device_token)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body.clone())
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status == StatusCode::OK {
                info!("Device code authentication completed");
                return Ok(serde_json::from_str(&text)?);
            }

            let error: ProviderErrorResponse = serde_json::from_str(&text).map_err(|_| {
                TokenmanError::Poll {
                    code: format!("http_{}", status.as_u16()),
                    description: text.chars().take(200).collect(),
                }
            })?;

            match error.error.as_str() {
                AUTHORIZATION_PENDING => {}
                EXPIRED_TOKEN => {
                    warn!("Device code expired");
                    return Err(TokenmanError::Expired);
                }
                code if DENIAL_CODES.contains(&code) => {
                    error!("Device code authentication denied: {}", error.description());
                    return Err(TokenmanError::Denied {
                        code: error.error.clone(),
                        description: error.description(),
                    });
                }
                _ => {
                    error!("Invalid poll response: {}", text);
                    return Err(TokenmanError::Poll {
                        code: error.error.clone(),
                        description: error.description(),
                    });
                }
            }

            if session.is_expired() {
                warn!("Device code expired");
                return Err(TokenmanError::Expired);
            }

            tokio::time::sleep(session.interval).await;
        }
    }
}

/// Join handle for a background poll
#[derive(Debug)]
pub struct PollHandle {
    result: oneshot::Receiver<Result<TokenResponse>>,
    state: watch::Receiver<DeviceCodeState>,
}

impl PollHandle {
    /// Current state of the poll
    pub fn state(&self) -> DeviceCodeState {
        *self.state.borrow()
    }

    /// Receiver for state transitions
    pub fn subscribe(&self) -> watch::Receiver<DeviceCodeState> {
        self.state.clone()
    }

    /// Wait for the terminal result
    pub async fn join(self) -> Result<TokenResponse> {
        self.result.await.map_err(|_| TokenmanError::PollWorker)?
    }
}
