//! Application-wide constants for pushlink.
//!
//! This module centralizes magic numbers, storage keys and wire strings so
//! that the retry schedule, banner timing and backend contract can be read in
//! one place.
//!
//! # Categories
//!
//! - **Timeouts**: Network timeouts
//! - **Retry**: Token update retry schedule
//! - **Banner**: In-app banner timing
//! - **Storage**: Persisted key names
//! - **Server**: Default backend location and notification text

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Default per-request timeout for backend calls.
///
/// Every HTTP request carries this timeout unless the configuration
/// overrides it, so a hung server can never stall a retry sequence.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Retry
// ============================================================================

/// Total attempts made by a token update before giving up.
pub const TOKEN_UPDATE_MAX_ATTEMPTS: u32 = 3;

/// Linear backoff step between token update attempts.
///
/// The wait after attempt `n` is `n * TOKEN_UPDATE_BACKOFF_STEP`,
/// i.e. 3s after the first failure and 6s after the second.
pub const TOKEN_UPDATE_BACKOFF_STEP: Duration = Duration::from_millis(3000);

// ============================================================================
// Banner
// ============================================================================

/// How long a banner stays visible before it dismisses itself.
pub const BANNER_DISPLAY_DURATION: Duration = Duration::from_secs(5);

/// Duration of the banner exit animation.
pub const BANNER_EXIT_DURATION: Duration = Duration::from_millis(300);

// ============================================================================
// Storage
// ============================================================================

/// Key holding the current push token.
pub const KEY_PUSH_TOKEN: &str = "fcmToken";

/// Key holding the device identity assigned at setup.
pub const KEY_DEVICE_ID: &str = "deviceId";

/// Key holding the setup completion flag (`"true"` once registered).
pub const KEY_SETUP_COMPLETED: &str = "setupCompleted";

// ============================================================================
// Server
// ============================================================================

/// Default backend base URL.
pub const DEFAULT_SERVER_URL: &str = "http://13.124.111.205:8080";

/// Title used for a notification whose payload has none.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Notification";

/// Title of the backend test notification.
pub const TEST_NOTIFICATION_TITLE: &str = "Test notification";

/// Body of the backend test notification when the caller gives none.
pub const TEST_NOTIFICATION_BODY: &str = "This is a test notification sent from pushlink.";

/// Name of the default notification channel configured before token issuance.
pub const DEFAULT_CHANNEL_NAME: &str = "default";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_constants() {
        assert_eq!(TOKEN_UPDATE_MAX_ATTEMPTS, 3);
        assert_eq!(TOKEN_UPDATE_BACKOFF_STEP, Duration::from_millis(3000));
        assert_eq!(TOKEN_UPDATE_BACKOFF_STEP * 2, Duration::from_millis(6000));
    }

    #[test]
    fn test_banner_timing() {
        assert!(BANNER_EXIT_DURATION < BANNER_DISPLAY_DURATION);
    }
}
