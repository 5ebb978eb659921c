//! Platform push capability.
//!
//! The OS-level permission prompt, token issuance and notification event
//! streams are consumed through the [`PushPlatform`] trait. Mobile shells
//! implement it over their native SDK; [`StaticPlatform`] is an in-process
//! implementation for hosts without a native push service and for tests.
//!
//! # Event streams
//!
//! ```text
//! platform ──Received──▶ listener ──▶ NotificationRouter ──▶ foreground handler
//!          ──Tapped────▶ listener ──▶ NotificationRouter ──▶ tap handler
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::notifications::PlatformNotification;

/// Notification permission state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The user allowed notifications.
    Granted,
    /// The user refused notifications.
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

impl PermissionStatus {
    /// Returns `true` if notifications are allowed.
    #[must_use]
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Importance of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelImportance {
    /// Default importance.
    Default,
    /// Heads-up notifications with sound.
    Max,
}

/// Notification channel configured before a token is issued.
///
/// Platforms without channels ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    /// Channel name.
    pub name: String,
    /// Channel importance.
    pub importance: ChannelImportance,
    /// Vibration pattern in milliseconds (wait, vibrate, wait, ...).
    pub vibration_pattern: Vec<u64>,
    /// LED color as `#AARRGGBB`.
    pub light_color: String,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self {
            name: crate::constants::DEFAULT_CHANNEL_NAME.to_string(),
            importance: ChannelImportance::Max,
            vibration_pattern: vec![0, 250, 250, 250],
            light_color: "#FF231F7C".to_string(),
        }
    }
}

/// The two platform event streams the router subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStream {
    /// A notification arrived while the application is in the foreground.
    Received,
    /// The user tapped a delivered notification.
    Tapped,
}

/// Opaque identifier of a platform subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Callback invoked by the platform for each event on a stream.
pub type PlatformListener = Arc<dyn Fn(PlatformNotification) + Send + Sync>;

/// Native push capability.
#[async_trait]
pub trait PushPlatform: Send + Sync + std::fmt::Debug {
    /// Whether this is a physical device able to receive pushes.
    fn is_physical_device(&self) -> bool;

    /// Current permission state, without prompting.
    async fn permission_status(&self) -> Result<PermissionStatus>;

    /// Prompt the user for permission and return the resulting state.
    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Configure a notification channel. No-op where channels do not exist.
    async fn configure_channel(&self, _channel: &NotificationChannel) -> Result<()> {
        Ok(())
    }

    /// Project identifier known to the platform build, if any.
    fn project_id(&self) -> Option<String>;

    /// Issue (or re-issue) a push token for `project_id`.
    async fn issue_token(&self, project_id: &str) -> Result<String>;

    /// Subscribe `listener` to `stream`.
    fn subscribe(&self, stream: EventStream, listener: PlatformListener) -> SubscriptionId;

    /// Remove a subscription. Returns `false` if it was already removed.
    fn remove_subscription(&self, id: SubscriptionId) -> bool;
}

/// Shared handle to a platform capability.
pub type SharedPlatform = Arc<dyn PushPlatform>;

#[derive(Default)]
struct Subscriptions {
    listeners: HashMap<SubscriptionId, (EventStream, PlatformListener)>,
    next_id: u64,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("active", &self.listeners.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// In-process platform with a configured token.
///
/// Permission prompts resolve to a preset answer, token issuance hands out
/// the configured token, and [`StaticPlatform::deliver`] feeds events to
/// subscribers the way a native SDK would.
#[derive(Debug)]
pub struct StaticPlatform {
    physical_device: bool,
    permission: Mutex<PermissionStatus>,
    prompt_answer: PermissionStatus,
    project_id: Option<String>,
    token: Mutex<Option<String>>,
    subscriptions: Mutex<Subscriptions>,
    channels: Mutex<Vec<NotificationChannel>>,
    prompts: AtomicU32,
    issued: AtomicU32,
}

impl StaticPlatform {
    /// A physical device with permission undetermined, answering prompts
    /// with `Granted`, issuing `token`.
    pub fn new(token: Option<String>) -> Self {
        Self {
            physical_device: true,
            permission: Mutex::new(PermissionStatus::Undetermined),
            prompt_answer: PermissionStatus::Granted,
            project_id: Some("static".to_string()),
            token: Mutex::new(token),
            subscriptions: Mutex::new(Subscriptions::default()),
            channels: Mutex::new(Vec::new()),
            prompts: AtomicU32::new(0),
            issued: AtomicU32::new(0),
        }
    }

    /// A host process without a native push service, issuing `token`.
    ///
    /// There is no OS permission gate on such a host, so permission starts
    /// out granted.
    pub fn host(token: Option<String>) -> Self {
        Self::new(token).with_permission(PermissionStatus::Granted)
    }

    /// Mark this platform as an emulator/simulator.
    pub fn emulator(mut self) -> Self {
        self.physical_device = false;
        self
    }

    /// Set the current permission state.
    pub fn with_permission(self, status: PermissionStatus) -> Self {
        *self.permission.lock().expect("permission mutex poisoned") = status;
        self
    }

    /// Set the answer given when the user is prompted.
    pub fn with_prompt_answer(mut self, answer: PermissionStatus) -> Self {
        self.prompt_answer = answer;
        self
    }

    /// Set (or clear) the project id the platform reports.
    pub fn with_project_id(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Replace the token handed out by subsequent issuances.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock().expect("token mutex poisoned") = token;
    }

    /// Number of permission prompts shown.
    pub fn prompt_count(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Number of token issuance calls received.
    pub fn issue_count(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Channels configured so far.
    pub fn configured_channels(&self) -> Vec<NotificationChannel> {
        self.channels.lock().expect("channels mutex poisoned").clone()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .listeners
            .len()
    }

    /// Deliver an event to every listener of `stream`.
    ///
    /// Listeners are cloned out of the registry before being invoked, so a
    /// listener may remove subscriptions while the dispatch is in flight.
    /// Returns the number of listeners invoked.
    pub fn deliver(&self, stream: EventStream, content: &PlatformNotification) -> usize {
        let listeners: Vec<PlatformListener> = {
            let subs = self
                .subscriptions
                .lock()
                .expect("subscriptions mutex poisoned");
            subs.listeners
                .values()
                .filter(|(s, _)| *s == stream)
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };

        for listener in &listeners {
            listener(content.clone());
        }
        listeners.len()
    }
}

#[async_trait]
impl PushPlatform for StaticPlatform {
    fn is_physical_device(&self) -> bool {
        self.physical_device
    }

    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(*self.permission.lock().expect("permission mutex poisoned"))
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let mut permission = self.permission.lock().expect("permission mutex poisoned");
        // The OS only shows the prompt once; a decided state sticks.
        if *permission == PermissionStatus::Undetermined {
            *permission = self.prompt_answer;
        }
        Ok(*permission)
    }

    async fn configure_channel(&self, channel: &NotificationChannel) -> Result<()> {
        self.channels
            .lock()
            .expect("channels mutex poisoned")
            .push(channel.clone());
        Ok(())
    }

    fn project_id(&self) -> Option<String> {
        self.project_id.clone()
    }

    async fn issue_token(&self, project_id: &str) -> Result<String> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        let token = self.token.lock().expect("token mutex poisoned").clone();
        token.ok_or_else(|| anyhow::anyhow!("No push token available for project '{project_id}'"))
    }

    fn subscribe(&self, stream: EventStream, listener: PlatformListener) -> SubscriptionId {
        let mut subs = self
            .subscriptions
            .lock()
            .expect("subscriptions mutex poisoned");
        let id = SubscriptionId::new(subs.next_id);
        subs.next_id += 1;
        subs.listeners.insert(id, (stream, listener));
        log::debug!("Subscribed {:?} listener {}", stream, id.get());
        id
    }

    fn remove_subscription(&self, id: SubscriptionId) -> bool {
        let removed = self
            .subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .listeners
            .remove(&id)
            .is_some();
        if removed {
            log::debug!("Removed listener {}", id.get());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_prompt_resolves_undetermined_once() {
        let platform = StaticPlatform::new(None).with_prompt_answer(PermissionStatus::Denied);
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Undetermined
        );

        assert_eq!(
            platform.request_permission().await.unwrap(),
            PermissionStatus::Denied
        );
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Denied
        );
        assert_eq!(platform.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_issue_token_without_token_fails() {
        let platform = StaticPlatform::new(None);
        assert!(platform.issue_token("p").await.is_err());

        platform.set_token(Some("tok".into()));
        assert_eq!(platform.issue_token("p").await.unwrap(), "tok");
        assert_eq!(platform.issue_count(), 2);
    }

    #[test]
    fn test_deliver_only_to_matching_stream() {
        let platform = StaticPlatform::new(None);
        let received = Arc::new(AtomicUsize::new(0));
        let tapped = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&received);
        platform.subscribe(
            EventStream::Received,
            Arc::new(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let t = Arc::clone(&tapped);
        platform.subscribe(
            EventStream::Tapped,
            Arc::new(move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let content = PlatformNotification::new("t", "b");
        assert_eq!(platform.deliver(EventStream::Received, &content), 1);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(tapped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_subscription_is_idempotent() {
        let platform = StaticPlatform::new(None);
        let id = platform.subscribe(EventStream::Received, Arc::new(|_| {}));
        assert_eq!(platform.subscription_count(), 1);

        assert!(platform.remove_subscription(id));
        assert!(!platform.remove_subscription(id));
        assert_eq!(platform.subscription_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_during_dispatch() {
        let platform = Arc::new(StaticPlatform::new(None));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let p = Arc::clone(&platform);
        let s = Arc::clone(&slot);
        let id = platform.subscribe(
            EventStream::Received,
            Arc::new(move |_| {
                if let Some(id) = s.lock().unwrap().take() {
                    p.remove_subscription(id);
                }
            }),
        );
        *slot.lock().unwrap() = Some(id);

        let content = PlatformNotification::default();
        assert_eq!(platform.deliver(EventStream::Received, &content), 1);
        assert_eq!(platform.subscription_count(), 0);
        assert_eq!(platform.deliver(EventStream::Received, &content), 0);
    }

    #[tokio::test]
    async fn test_host_platform_is_granted_without_prompt() {
        let platform = StaticPlatform::host(Some("tok".into()));
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Granted
        );
        assert_eq!(platform.prompt_count(), 0);
    }

    #[test]
    fn test_default_channel() {
        let channel = NotificationChannel::default();
        assert_eq!(channel.name, "default");
        assert_eq!(channel.importance, ChannelImportance::Max);
        assert_eq!(channel.vibration_pattern, vec![0, 250, 250, 250]);
        assert_eq!(channel.light_color, "#FF231F7C");
    }
}
