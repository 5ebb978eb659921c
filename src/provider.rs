//! Push token issuance.
//!
//! [`TokenProvider`] asks the platform for notification permission and for a
//! push token, persisting every newly issued token so it supersedes the
//! stored one. Failures never escape as errors from the lenient entry
//! points: they are logged and reported as `false` / `None`.

use crate::error::PushError;
use crate::platform::{NotificationChannel, PermissionStatus, SharedPlatform};
use crate::store::TokenStore;

/// Shorten a token for log and terminal output.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(12).collect();
    if prefix.len() < token.len() {
        format!("{prefix}…")
    } else {
        prefix
    }
}

/// Obtains push tokens from the platform and keeps the store current.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    platform: SharedPlatform,
    tokens: TokenStore,
    channel: NotificationChannel,
    project_id: Option<String>,
}

impl TokenProvider {
    /// Create a provider.
    ///
    /// # Arguments
    ///
    /// * `platform` - Native push capability
    /// * `tokens` - Where issued tokens are persisted
    /// * `project_id` - Configured project identifier; the platform's own is
    ///   used when `None`
    pub fn new(platform: SharedPlatform, tokens: TokenStore, project_id: Option<String>) -> Self {
        Self {
            platform,
            tokens,
            channel: NotificationChannel::default(),
            project_id,
        }
    }

    /// The token store this provider writes to.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Current permission state without prompting.
    ///
    /// Platform errors are reported as `Undetermined`.
    pub async fn permission_status(&self) -> PermissionStatus {
        match self.platform.permission_status().await {
            Ok(status) => status,
            Err(e) => {
                log::error!("Failed to query notification permission: {e:#}");
                PermissionStatus::Undetermined
            }
        }
    }

    /// Ensure notification permission, prompting if it is not granted yet.
    ///
    /// Returns `true` only if permission ends up granted. Fails closed on
    /// emulators and on platform errors.
    pub async fn request_permission(&self) -> bool {
        if !self.platform.is_physical_device() {
            log::warn!("Push notifications only work on a physical device");
            return false;
        }

        let status = match self.platform.permission_status().await {
            Ok(PermissionStatus::Granted) => PermissionStatus::Granted,
            Ok(_) => match self.platform.request_permission().await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Notification permission prompt failed: {e:#}");
                    return false;
                }
            },
            Err(e) => {
                log::error!("Failed to query notification permission: {e:#}");
                return false;
            }
        };

        if status.is_granted() {
            true
        } else {
            log::info!("Notification permission denied");
            false
        }
    }

    /// Issue a token, persisting it before returning.
    ///
    /// Returns `None` on any failure; the cause is logged.
    pub async fn issue_token(&self) -> Option<String> {
        match self.try_issue_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                log::error!("Failed to obtain push token: {e}");
                None
            }
        }
    }

    /// Issue a token, reporting why it could not be obtained.
    ///
    /// The platform's token API is never called without permission.
    pub async fn try_issue_token(&self) -> Result<String, PushError> {
        if !self.request_permission().await {
            return Err(PushError::PermissionDenied);
        }

        if let Err(e) = self.platform.configure_channel(&self.channel).await {
            log::warn!(
                "Failed to configure notification channel '{}': {e:#}",
                self.channel.name
            );
        }

        let project_id = self
            .project_id
            .clone()
            .or_else(|| self.platform.project_id())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PushError::TokenUnavailable("project id not found".to_string()))?;

        let token = self
            .platform
            .issue_token(&project_id)
            .await
            .map_err(|e| PushError::TokenUnavailable(format!("{e:#}")))?;

        log::info!("Obtained push token {}", redact(&token));

        if let Err(e) = self.tokens.set(&token) {
            // The token is still usable for this session.
            log::error!("{e:#}");
        }

        Ok(token)
    }

    /// The token to send to the backend: stored token first, otherwise a
    /// freshly issued one.
    pub async fn current_token(&self) -> Option<String> {
        if let Some(token) = self.tokens.get() {
            return Some(token);
        }
        log::info!("No stored push token, requesting a new one");
        self.issue_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticPlatform;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn provider_with(platform: StaticPlatform) -> (TokenProvider, Arc<StaticPlatform>) {
        let platform = Arc::new(platform);
        let tokens = TokenStore::new(MemoryStore::shared());
        let provider = TokenProvider::new(Arc::clone(&platform) as SharedPlatform, tokens, None);
        (provider, platform)
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("short"), "short");
        assert_eq!(redact("ExponentPushToken[abcdef]"), "ExponentPush…");
    }

    #[tokio::test]
    async fn test_issue_token_persists() {
        let (provider, platform) = provider_with(StaticPlatform::new(Some("tok-A".into())));

        assert_eq!(provider.issue_token().await.as_deref(), Some("tok-A"));
        assert_eq!(provider.tokens().get().as_deref(), Some("tok-A"));
        assert_eq!(platform.configured_channels().len(), 1);
    }

    #[tokio::test]
    async fn test_new_token_supersedes_stored() {
        let (provider, platform) = provider_with(StaticPlatform::new(Some("tok-A".into())));
        provider.issue_token().await.unwrap();

        platform.set_token(Some("tok-B".into()));
        provider.issue_token().await.unwrap();
        assert_eq!(provider.tokens().get().as_deref(), Some("tok-B"));
    }

    #[tokio::test]
    async fn test_permission_denied_never_issues() {
        let (provider, platform) = provider_with(
            StaticPlatform::new(Some("tok-A".into()))
                .with_prompt_answer(PermissionStatus::Denied),
        );
        provider.tokens().set("old").unwrap();

        assert!(!provider.request_permission().await);
        assert_eq!(
            provider.try_issue_token().await,
            Err(PushError::PermissionDenied)
        );
        assert_eq!(platform.issue_count(), 0);
        assert_eq!(provider.tokens().get().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_granted_permission_skips_prompt() {
        let (provider, platform) = provider_with(
            StaticPlatform::new(None).with_permission(PermissionStatus::Granted),
        );
        assert!(provider.request_permission().await);
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_emulator_fails_closed() {
        let (provider, platform) =
            provider_with(StaticPlatform::new(Some("tok".into())).emulator());
        assert!(!provider.request_permission().await);
        assert_eq!(provider.issue_token().await, None);
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_project_id_is_token_unavailable() {
        let (provider, platform) =
            provider_with(StaticPlatform::new(Some("tok".into())).with_project_id(None));

        let err = provider.try_issue_token().await.unwrap_err();
        assert!(matches!(err, PushError::TokenUnavailable(_)));
        assert_eq!(platform.issue_count(), 0);
        assert_eq!(provider.tokens().get(), None);
    }

    #[tokio::test]
    async fn test_configured_project_id_wins() {
        let platform = Arc::new(StaticPlatform::new(Some("tok".into())).with_project_id(None));
        let provider = TokenProvider::new(
            Arc::clone(&platform) as SharedPlatform,
            TokenStore::new(MemoryStore::shared()),
            Some("proj-1".into()),
        );
        assert_eq!(provider.issue_token().await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_current_token_prefers_store() {
        let (provider, platform) = provider_with(StaticPlatform::new(Some("fresh".into())));
        provider.tokens().set("stored").unwrap();

        assert_eq!(provider.current_token().await.as_deref(), Some("stored"));
        assert_eq!(platform.issue_count(), 0);
    }

    #[tokio::test]
    async fn test_current_token_falls_back_to_issue() {
        let (provider, platform) = provider_with(StaticPlatform::new(Some("fresh".into())));

        assert_eq!(provider.current_token().await.as_deref(), Some("fresh"));
        assert_eq!(platform.issue_count(), 1);
        assert_eq!(provider.tokens().get().as_deref(), Some("fresh"));
    }
}
