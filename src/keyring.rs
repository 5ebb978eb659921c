//! OS keyring backend for the key-value store.
//!
//! Stores all pushlink values in a single keyring entry holding a JSON
//! object, so a new build triggers at most one macOS keychain prompt.
//!
//! # Storage
//!
//! Production: Single OS keyring entry `pushlink/store`.
//! Test mode (`PUSHLINK_ENV=test`): callers use [`crate::store::FileStore`]
//! instead; see [`open_default_store`].
//!
//! # Graceful Degradation
//!
//! Reads distinguish between a missing entry (normal first run, empty map),
//! corrupted data (logged, empty map) and access problems (retried once,
//! then surfaced as an error).

use anyhow::Result;
use keyring::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::store::{FileStore, KeyValueStore, SharedStore};

/// Keyring service name.
const KEYRING_SERVICE: &str = "pushlink";
/// Consolidated keyring entry name.
const KEYRING_ENTRY: &str = "store";

/// Number of attempts for keyring reads.
const KEYRING_RETRY_ATTEMPTS: u32 = 2;
/// Delay between keyring read attempts in milliseconds.
const KEYRING_RETRY_DELAY_MS: u64 = 500;

/// Categorized keyring access errors for better user feedback.
#[derive(Debug)]
pub enum KeyringAccessError {
    /// Entry does not exist (normal for first run).
    NotFound,
    /// Access denied or keychain locked.
    AccessDenied(String),
    /// Data exists but is not a JSON object of strings.
    Corrupted(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Keyring entry not found"),
            Self::AccessDenied(msg) => write!(f, "Keyring access denied: {msg}"),
            Self::Corrupted(msg) => write!(f, "Keyring data corrupted: {msg}"),
            Self::Other(msg) => write!(f, "Keyring error: {msg}"),
        }
    }
}

impl std::error::Error for KeyringAccessError {}

fn categorize_keyring_error(err: keyring::Error) -> KeyringAccessError {
    match err {
        keyring::Error::NoEntry => KeyringAccessError::NotFound,
        keyring::Error::NoStorageAccess(e) => KeyringAccessError::AccessDenied(e.to_string()),
        keyring::Error::BadEncoding(_) => {
            KeyringAccessError::Corrupted("entry is not valid UTF-8".to_string())
        }
        other => KeyringAccessError::Other(other.to_string()),
    }
}

/// Key-value store kept in one OS keyring entry.
///
/// Every call blocks the calling thread on the platform keychain, and a
/// failed read sleeps for `KEYRING_RETRY_DELAY_MS` between attempts. On a
/// tokio runtime this stalls the worker for the duration, which is
/// acceptable for the handful of reads and writes a CLI invocation makes.
/// Long-running callers should wrap store access in
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Default)]
pub struct KeyringStore {
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl KeyringStore {
    /// Create a keyring-backed store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, KEYRING_ENTRY)
            .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {e:?}"))
    }

    fn load_with_retry() -> Result<HashMap<String, String>> {
        let mut last_error = None;

        for attempt in 0..KEYRING_RETRY_ATTEMPTS {
            if attempt > 0 {
                log::debug!(
                    "Retrying keyring access (attempt {}/{})",
                    attempt + 1,
                    KEYRING_RETRY_ATTEMPTS
                );
                thread::sleep(Duration::from_millis(KEYRING_RETRY_DELAY_MS));
            }

            match Self::try_load() {
                Ok(map) => return Ok(map),
                Err(KeyringAccessError::NotFound) => return Ok(HashMap::new()),
                Err(KeyringAccessError::Corrupted(msg)) => {
                    log::warn!("Keyring data corrupted, starting empty: {msg}");
                    return Ok(HashMap::new());
                }
                Err(err) => {
                    log::debug!("Keyring access attempt {} failed: {}", attempt + 1, err);
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err.into()),
            None => Ok(HashMap::new()),
        }
    }

    fn try_load() -> std::result::Result<HashMap<String, String>, KeyringAccessError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_ENTRY)
            .map_err(|e| KeyringAccessError::Other(format!("Failed to create entry: {e:?}")))?;

        let json = entry.get_password().map_err(categorize_keyring_error)?;
        serde_json::from_str(&json)
            .map_err(|e| KeyringAccessError::Corrupted(format!("JSON parse error: {e}")))
    }

    fn save(map: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(map)?;
        Self::entry()?
            .set_password(&json)
            .map_err(|e| anyhow::anyhow!("Failed to store values in keyring: {e:?}"))?;
        log::debug!("Saved {} value(s) to OS keyring", map.len());
        Ok(())
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().expect("KeyringStore mutex poisoned");
        Ok(Self::load_with_retry()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("KeyringStore mutex poisoned");
        let mut map = Self::load_with_retry()?;
        map.insert(key.to_string(), value.to_string());
        Self::save(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("KeyringStore mutex poisoned");
        let mut map = Self::load_with_retry()?;
        if map.remove(key).is_some() {
            Self::save(&map)?;
        }
        Ok(())
    }
}

/// Open the store used by the binary: the OS keyring in production, a file
/// in the config directory in test mode.
pub fn open_default_store() -> Result<SharedStore> {
    if crate::env::should_skip_keyring() {
        let store = FileStore::in_config_dir()?;
        log::debug!("Using file store at {} (test mode)", store.path().display());
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(KeyringStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_no_entry() {
        assert!(matches!(
            categorize_keyring_error(keyring::Error::NoEntry),
            KeyringAccessError::NotFound
        ));
    }

    #[test]
    fn test_categorize_other() {
        let err = keyring::Error::TooLong("user".to_string(), 255);
        assert!(matches!(
            categorize_keyring_error(err),
            KeyringAccessError::Other(_)
        ));
    }

    #[test]
    fn test_access_error_display() {
        assert_eq!(
            KeyringAccessError::NotFound.to_string(),
            "Keyring entry not found"
        );
        assert_eq!(
            KeyringAccessError::Corrupted("bad".into()).to_string(),
            "Keyring data corrupted: bad"
        );
    }
}
