//! Backend client for device registration and token reconciliation.
//!
//! This module provides the [`BackendClient`] struct which handles all HTTP
//! communication with the push backend. Every request carries an explicit
//! timeout, and every call that needs a push token resolves it at call time
//! through the [`TokenProvider`] (stored token first, then a fresh one).

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::retry::{RetryPolicy, TokenUpdateReport, UpdateStatus};
use super::types::{
    ApiResponse, DeviceProfile, RegisterPayload, ServerRecord, TestNotificationData,
    TestNotificationPayload, TokenUpdatePayload,
};
use crate::constants;
use crate::error::PushError;
use crate::provider::{redact, TokenProvider};

/// Client for the push backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    server_url: String,
    provider: TokenProvider,
    retry: RetryPolicy,
}

impl BackendClient {
    /// Creates a client with the given per-request timeout.
    ///
    /// # Arguments
    ///
    /// * `server_url` - Base URL of the backend
    /// * `timeout` - Timeout applied to every request
    /// * `provider` - Resolves the push token sent with requests
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(server_url: String, timeout: Duration, provider: TokenProvider) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, server_url, provider))
    }

    /// Creates a client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, server_url: String, provider: TokenProvider) -> Self {
        Self {
            client,
            server_url,
            provider,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the token update retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Returns the token provider used to resolve tokens.
    pub fn provider(&self) -> &TokenProvider {
        &self.provider
    }

    /// Returns the token update retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Build `{server_url}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PushError> {
        let mut url = Url::parse(&self.server_url).map_err(|e| {
            PushError::Network(format!("invalid server URL '{}': {e}", self.server_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                PushError::Network(format!("server URL '{}' cannot be a base", self.server_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Classify a response into an acknowledged envelope or a failure.
    ///
    /// Non-2xx is an application failure (carrying the server message when
    /// the body parses). A 2xx body that is not JSON is malformed.
    async fn read_response(response: Response) -> Result<ApiResponse, PushError> {
        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<ApiResponse>(&body);

        if !status.is_success() {
            let message = parsed.map(|r| r.message).unwrap_or_default();
            return Err(PushError::Application {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parsed.map_err(|e| PushError::MalformedResponse(e.to_string()))?;
        log::debug!("Backend response ({}): {:?}", status, parsed);

        if parsed.success {
            Ok(parsed)
        } else {
            Err(PushError::Application {
                status: status.as_u16(),
                message: parsed.message,
            })
        }
    }

    /// Registers a device with its profile and current push token.
    ///
    /// Single attempt. The token is resolved lazily; registration proceeds
    /// with a `null` token if none can be obtained.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Application`] carrying the server's message when
    /// the backend rejects the registration, or a transport/parse error.
    pub async fn register_device(&self, profile: &DeviceProfile) -> Result<ServerRecord, PushError> {
        let token = self.provider.current_token().await;
        if token.is_none() {
            log::warn!("Registering {} without a push token", profile.device_id);
        }

        let payload = RegisterPayload::new(profile, token);
        let result = async {
            let url = self.endpoint(&["api", "users", "register"])?;
            log::debug!("Registering device {} at {}", profile.device_id, url);
            let response = self.client.post(url).json(&payload).send().await?;
            Self::read_response(response).await
        }
        .await;

        match result {
            Ok(resp) => {
                let record = ServerRecord::from_data(resp.data);
                log::info!(
                    "Registered device {} (record {:?})",
                    profile.device_id,
                    record.id
                );
                Ok(record)
            }
            Err(e) => {
                log::error!("Device registration failed for {}: {e}", profile.device_id);
                Err(e)
            }
        }
    }

    /// Sends `token` for `device_id` once, without retry.
    ///
    /// Used on the silent startup path; failures are logged and deferred.
    pub async fn send_token(&self, device_id: &str, token: &str) -> bool {
        match self.try_send_token(device_id, token).await {
            Ok(()) => {
                log::info!("Push token sent for {device_id}");
                true
            }
            Err(e) => {
                log::warn!("Push token send failed for {device_id}: {e}");
                false
            }
        }
    }

    async fn try_send_token(&self, device_id: &str, token: &str) -> Result<(), PushError> {
        let url = self.endpoint(&["api", "users", device_id])?;
        log::debug!("Sending push token {} to {}", redact(token), url);

        let payload = TokenUpdatePayload {
            fcm_token: token.to_string(),
        };
        let response = self.client.put(url).json(&payload).send().await?;
        Self::read_response(response).await.map(|_| ())
    }

    async fn try_token_update(&self, device_id: &str) -> Result<(), PushError> {
        let token = self
            .provider
            .current_token()
            .await
            .ok_or_else(|| PushError::TokenUnavailable("no push token".to_string()))?;
        self.try_send_token(device_id, &token).await
    }

    /// Pushes the current token for `device_id`, retrying transient failures.
    ///
    /// Returns `true` only if an attempt was acknowledged by the server.
    pub async fn push_token_update(&self, device_id: &str) -> bool {
        self.push_token_update_with_cancel(device_id, &CancellationToken::new())
            .await
            .succeeded()
    }

    /// Pushes the current token for `device_id` until acknowledged, attempts
    /// are exhausted, a non-retryable failure occurs, or `cancel` fires.
    ///
    /// Attempts are strictly sequential. The token is re-resolved on every
    /// attempt. Concurrent sequences for the same device are not
    /// deduplicated; the backend update is an idempotent upsert.
    pub async fn push_token_update_with_cancel(
        &self,
        device_id: &str,
        cancel: &CancellationToken,
    ) -> TokenUpdateReport {
        let mut report = TokenUpdateReport::new();
        let max_attempts = self.retry.max_attempts();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                break;
            }
            report.attempts = attempt;
            log::info!(
                "Updating push token for {device_id} (attempt {attempt}/{max_attempts})"
            );

            let result = tokio::select! {
                result = self.try_token_update(device_id) => result,
                () = cancel.cancelled() => break,
            };

            match result {
                Ok(()) => {
                    log::info!("Push token updated for {device_id}");
                    report.status = UpdateStatus::Succeeded;
                    report.last_error = None;
                    return report;
                }
                Err(e) => {
                    log::error!(
                        "Push token update failed for {device_id} (attempt {attempt}/{max_attempts}): {e}"
                    );
                    let retryable = e.is_retryable();
                    report.last_error = Some(e);
                    if !retryable {
                        return report;
                    }
                }
            }

            let Some(delay) = self.retry.delay_after(attempt) else {
                return report;
            };
            log::info!("Retrying in {:.1}s...", delay.as_secs_f32());

            tokio::select! {
                () = tokio::time::sleep(delay) => report.waits.push(delay),
                () = cancel.cancelled() => break,
            }
        }

        // Only reachable through cancellation: every other path returns above.
        log::info!("Push token update for {device_id} cancelled");
        report.status = UpdateStatus::Cancelled;
        report.last_error = Some(PushError::Cancelled);
        report
    }

    /// Asks the backend to push a test notification to `device_id`.
    ///
    /// Single attempt; `true` only on transport and application success.
    pub async fn send_test_notification(&self, device_id: &str, message: Option<&str>) -> bool {
        let payload = TestNotificationPayload {
            target_type: "token".to_string(),
            device_id: device_id.to_string(),
            title: constants::TEST_NOTIFICATION_TITLE.to_string(),
            body: message
                .filter(|m| !m.is_empty())
                .unwrap_or(constants::TEST_NOTIFICATION_BODY)
                .to_string(),
            data: TestNotificationData {
                kind: "test".to_string(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        };

        let result = async {
            let url = self.endpoint(&["api", "v1", "fcm", "send"])?;
            let response = self.client.post(url).json(&payload).send().await?;
            Self::read_response(response).await
        }
        .await;

        match result {
            Ok(_) => {
                log::info!("Test notification requested for {device_id}");
                true
            }
            Err(e) => {
                log::error!("Test notification request failed for {device_id}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{SharedPlatform, StaticPlatform};
    use crate::store::{MemoryStore, TokenStore};
    use std::sync::Arc;

    fn client(server_url: &str) -> BackendClient {
        let platform: SharedPlatform = Arc::new(StaticPlatform::new(None));
        let provider = TokenProvider::new(platform, TokenStore::new(MemoryStore::shared()), None);
        BackendClient::new(
            server_url.to_string(),
            constants::HTTP_REQUEST_TIMEOUT,
            provider,
        )
        .unwrap()
    }

    #[test]
    fn test_backend_client_creation() {
        let client = client("https://example.com");
        assert_eq!(client.server_url(), "https://example.com");
        assert_eq!(client.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = client("http://localhost:8080");
        let url = client.endpoint(&["api", "users", "register"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users/register");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("http://localhost:8080/base/");
        let url = client.endpoint(&["api", "users", "d1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/base/api/users/d1");
    }

    #[test]
    fn test_endpoint_encodes_device_id() {
        let client = client("http://localhost:8080");
        let url = client.endpoint(&["api", "users", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users/a%2Fb%20c");
    }

    #[test]
    fn test_endpoint_rejects_invalid_url() {
        let client = client("not a url");
        assert!(matches!(
            client.endpoint(&["api"]),
            Err(PushError::Network(_))
        ));
    }
}
