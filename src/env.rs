//! Test mode detection.
//!
//! `PUSHLINK_ENV=test` switches persistence from the OS keyring to a file
//! in the config directory, so test runs never touch the user's keychain.
//! Any other value, or no value, is normal operation.

/// Returns `true` if `PUSHLINK_ENV` selects test mode.
#[must_use]
pub fn is_test_mode() -> bool {
    is_test_value(std::env::var("PUSHLINK_ENV").ok().as_deref())
}

fn is_test_value(value: Option<&str>) -> bool {
    value == Some("test")
}

/// Returns `true` if the OS keyring should be bypassed in favor of the
/// file store.
#[must_use]
pub fn should_skip_keyring() -> bool {
    is_test_mode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exact_test_value_selects_test_mode() {
        assert!(is_test_value(Some("test")));
        assert!(!is_test_value(Some("TEST")));
        assert!(!is_test_value(Some("development")));
        assert!(!is_test_value(Some("")));
        assert!(!is_test_value(None));
    }
}
