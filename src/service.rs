//! Push notification service.
//!
//! [`PushService`] is the composition root of the subsystem. It owns the
//! token store, the token provider, the backend client, the notification
//! router and the banner, and exposes the operations an application shell
//! calls: startup, registration and the settings actions.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ start() ──▶ [listeners attached, banner driver running] ──▶ shutdown()
//! ```
//!
//! Settings actions return a [`Notice`] for the shell to present; none of
//! them return errors.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::banner::SharedBanner;
use crate::config::Config;
use crate::error::PushError;
use crate::platform::{SharedPlatform, StaticPlatform};
use crate::provider::{redact, TokenProvider};
use crate::router::{HandlerSubscription, ListenerHandle, NotificationRouter};
use crate::server::{BackendClient, DeviceProfile, RetryPolicy, ServerRecord, TokenUpdateReport};
use crate::store::{DeviceState, RegistrationStatus, SharedStore, TokenStore};

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// The action completed.
    Info,
    /// The action partially completed, or needs the user to act.
    Warning,
    /// The action failed.
    Error,
}

/// A user-facing message produced by a settings action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Short heading.
    pub title: String,
    /// Explanation, with guidance when the user has to act.
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: &str, message: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.to_string(),
        }
    }

    fn info(title: &str, message: &str) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    fn warning(title: &str, message: &str) -> Self {
        Self::new(NoticeLevel::Warning, title, message)
    }

    fn error(title: &str, message: &str) -> Self {
        Self::new(NoticeLevel::Error, title, message)
    }

    fn device_unknown() -> Self {
        Self::error(
            "Error",
            "Device information was not found. Register this device first.",
        )
    }

    fn permission_required() -> Self {
        Self::warning(
            "Permission required",
            "To receive notifications, allow notifications for this app in the system settings.",
        )
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// What [`PushService::start`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Token obtained at startup, if any.
    pub token: Option<String>,
    /// Registration status after the token was obtained.
    pub status: RegistrationStatus,
    /// Whether the token was sent to the backend; `None` when no send was
    /// attempted (not registered, or no token).
    pub token_sent: Option<bool>,
}

#[derive(Debug)]
struct Running {
    listeners: ListenerHandle,
    foreground: HandlerSubscription,
    driver_cancel: CancellationToken,
    driver: JoinHandle<()>,
}

/// Push notification service.
#[derive(Debug)]
pub struct PushService {
    config: Config,
    tokens: TokenStore,
    device: DeviceState,
    provider: TokenProvider,
    client: BackendClient,
    router: NotificationRouter,
    banner: SharedBanner,
    running: Mutex<Option<Running>>,
}

impl PushService {
    /// Assemble the service from its configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: Config, platform: SharedPlatform, store: SharedStore) -> Result<Self> {
        let tokens = TokenStore::new(Arc::clone(&store));
        let device = DeviceState::new(store);
        let provider = TokenProvider::new(
            Arc::clone(&platform),
            tokens.clone(),
            config.project_id.clone(),
        );
        let client = BackendClient::new(
            config.server_url.clone(),
            config.request_timeout(),
            provider.clone(),
        )?;

        Ok(Self {
            config,
            tokens,
            device,
            provider,
            client,
            router: NotificationRouter::new(platform),
            banner: SharedBanner::default(),
            running: Mutex::new(None),
        })
    }

    /// Assemble the service for a host process: a [`StaticPlatform::host`]
    /// issuing the configured push token.
    ///
    /// Returns the platform too, so the caller can deliver events to it.
    pub fn host(config: Config, store: SharedStore) -> Result<(Self, Arc<StaticPlatform>)> {
        let platform = Arc::new(StaticPlatform::host(config.push_token.clone()));
        let service = Self::new(config, Arc::clone(&platform) as SharedPlatform, store)?;
        Ok((service, platform))
    }

    /// Replace the token update retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry_policy(retry);
        self
    }

    /// Replace the banner.
    pub fn with_banner(mut self, banner: SharedBanner) -> Self {
        self.banner = banner;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The notification router, for installing the tap handler.
    pub fn router(&self) -> &NotificationRouter {
        &self.router
    }

    /// The in-app banner fed by foreground notifications.
    pub fn banner(&self) -> &SharedBanner {
        &self.banner
    }

    /// The backend client.
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// The token provider.
    pub fn provider(&self) -> &TokenProvider {
        &self.provider
    }

    /// Whether listeners are attached.
    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().expect("service state mutex poisoned")
    }

    /// Start the service: route foreground notifications to the banner,
    /// attach platform listeners, obtain a token and, when this device is
    /// registered, send it to the backend once.
    ///
    /// Never fails: problems are logged and deferred to the next
    /// registration or settings action. Must be called from within a tokio
    /// runtime.
    pub async fn start(&self) -> StartupReport {
        self.attach();

        let token = self.provider.issue_token().await;
        let status = self.registration_status();

        let token_sent = match (&token, self.device.device_id()) {
            (Some(token), Some(device_id)) if status.is_registered() => {
                Some(self.client.send_token(&device_id, token).await)
            }
            (None, _) => {
                log::warn!("Started without a push token");
                None
            }
            _ => {
                log::info!("Device not registered yet, token will be sent after registration");
                None
            }
        };

        log::info!(
            "Push service started ({status}, token: {})",
            token.as_deref().map(redact).unwrap_or_else(|| "none".to_string())
        );

        StartupReport {
            token,
            status,
            token_sent,
        }
    }

    fn attach(&self) {
        let mut running = self.lock_running();
        if running.is_some() {
            log::debug!("Push service already started");
            return;
        }

        let banner = self.banner.clone();
        let foreground = self
            .router
            .set_foreground_handler(move |event| banner.show(event.clone()));
        let listeners = self.router.register_listeners();
        let driver_cancel = CancellationToken::new();
        let driver = self.banner.spawn_driver(driver_cancel.clone());

        *running = Some(Running {
            listeners,
            foreground,
            driver_cancel,
            driver,
        });
    }

    /// Detach listeners, drop the foreground handler and stop the banner
    /// driver. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let Some(mut running) = self.lock_running().take() else {
            return;
        };

        self.router.unregister_listeners(&mut running.listeners);
        self.router.unsubscribe(running.foreground);
        running.driver_cancel.cancel();
        if let Err(e) = running.driver.await {
            log::warn!("Banner driver ended abnormally: {e}");
        }
        log::info!("Push service stopped");
    }

    /// Register this device with the backend.
    ///
    /// On success the device id and the setup flag are persisted.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, carrying the server's message if any.
    pub async fn register(&self, profile: &DeviceProfile) -> Result<ServerRecord, PushError> {
        let record = self.client.register_device(profile).await?;
        if let Err(e) = self.device.mark_registered(&profile.device_id) {
            log::error!("{e:#}");
        }
        Ok(record)
    }

    /// Registration status derived from the store.
    pub fn registration_status(&self) -> RegistrationStatus {
        self.device.status(&self.tokens)
    }

    /// The stored push token.
    pub fn stored_token(&self) -> Option<String> {
        self.tokens.get()
    }

    /// The device identity assigned at registration.
    pub fn device_id(&self) -> Option<String> {
        self.device.device_id()
    }

    /// Push the current token for this device with retries, until
    /// acknowledged, exhausted or `cancel` fires.
    ///
    /// `None` when no device identity is known.
    pub async fn update_token(&self, cancel: &CancellationToken) -> Option<TokenUpdateReport> {
        let device_id = self.device.device_id()?;
        Some(
            self.client
                .push_token_update_with_cancel(&device_id, cancel)
                .await,
        )
    }

    /// Settings action: turn notifications on.
    pub async fn enable_notifications(&self) -> Notice {
        if !self.provider.request_permission().await {
            return Notice::permission_required();
        }

        if self.provider.issue_token().await.is_none() {
            return Notice::error(
                "Error",
                "Notifications are allowed, but a push token could not be obtained. Try again later.",
            );
        }

        let Some(device_id) = self.device.device_id() else {
            return Notice::info("Done", "Notifications have been enabled.");
        };

        if self.client.push_token_update(&device_id).await {
            Notice::info("Done", "Notifications have been enabled.")
        } else {
            Notice::warning(
                "Partially completed",
                "Notifications are enabled, but the server could not be updated. It will be retried automatically on the next start.",
            )
        }
    }

    /// Settings action: obtain a new token and send it to the backend.
    pub async fn refresh_token(&self) -> Notice {
        let Some(device_id) = self.device.device_id() else {
            return Notice::device_unknown();
        };

        if self.provider.issue_token().await.is_none() {
            return Notice::error("Failed", "Could not obtain a push token.");
        }

        if self.client.push_token_update(&device_id).await {
            Notice::info("Done", "The push token has been refreshed.")
        } else {
            Notice::warning(
                "Partially completed",
                "The push token was refreshed, but the server update failed. It will be retried automatically later.",
            )
        }
    }

    /// Settings action: ask the backend to push a test notification.
    pub async fn send_test_notification(&self, message: Option<&str>) -> Notice {
        let Some(device_id) = self.device.device_id() else {
            return Notice::device_unknown();
        };

        if !self.provider.permission_status().await.is_granted() {
            return Notice::warning("Permission required", "Allow notifications first.");
        }

        if self.client.send_test_notification(&device_id, message).await {
            Notice::info(
                "Test notification sent",
                "It should arrive shortly. If it does not, move the app to the background and check again.",
            )
        } else {
            Notice::error(
                "Send failed",
                "The test notification could not be sent. Check your network connection and the server status.",
            )
        }
    }
}
