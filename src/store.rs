//! Key-value persistence for the push token and device setup state.
//!
//! The platform storage is modelled as an opaque get/set interface,
//! [`KeyValueStore`]. Three backends exist:
//!
//! - [`MemoryStore`] - process-local, used by tests and ephemeral sessions
//! - [`FileStore`] - a JSON object on disk (owner read/write only)
//! - [`crate::keyring::KeyringStore`] - a single OS keyring entry
//!
//! On top of the raw store sit two typed views: [`TokenStore`] for the
//! current push token and [`DeviceState`] for the externally-owned device
//! identity and setup flag.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::constants::{KEY_DEVICE_ID, KEY_PUSH_TOKEN, KEY_SETUP_COMPLETED};

/// Opaque string key-value persistence.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a value. `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Shared handle to a key-value store.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared empty store.
    #[must_use]
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().expect("MemoryStore mutex poisoned");
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().expect("MemoryStore mutex poisoned");
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().expect("MemoryStore mutex poisoned");
        values.remove(key);
        Ok(())
    }
}

/// JSON file store.
///
/// The whole map is rewritten on every `set`; the file is small (three keys).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Create a store at `{config_dir}/store.json`.
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(crate::config::Config::config_dir()?.join("store.json")))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupted store file {}", self.path.display()))
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().expect("FileStore mutex poisoned");
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("FileStore mutex poisoned");
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("FileStore mutex poisoned");
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Typed view over the persisted push token.
///
/// A stored token is trusted until explicitly overwritten; there is no
/// expiry and no validation of its shape.
#[derive(Debug, Clone)]
pub struct TokenStore {
    store: SharedStore,
}

impl TokenStore {
    /// Wrap a key-value store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current token, if one has been stored.
    ///
    /// Storage errors are logged and reported as "no token".
    pub fn get(&self) -> Option<String> {
        match self.store.get(KEY_PUSH_TOKEN) {
            Ok(token) => token,
            Err(e) => {
                log::error!("Failed to read stored push token: {e:#}");
                None
            }
        }
    }

    /// Replace the stored token.
    pub fn set(&self, token: &str) -> Result<()> {
        self.store
            .set(KEY_PUSH_TOKEN, token)
            .context("Failed to persist push token")
    }
}

/// Registration state of this installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// No device identity, or setup never completed.
    NotRegistered,
    /// Registered with the backend, no token stored locally.
    Registered,
    /// Registered and holding a push token.
    RegisteredWithToken,
}

impl RegistrationStatus {
    /// Whether token pushes to the backend are allowed.
    #[must_use]
    pub fn is_registered(self) -> bool {
        !matches!(self, Self::NotRegistered)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "not_registered"),
            Self::Registered => write!(f, "registered"),
            Self::RegisteredWithToken => write!(f, "registered_with_token"),
        }
    }
}

/// Typed view over the device identity and setup flag.
#[derive(Debug, Clone)]
pub struct DeviceState {
    store: SharedStore,
}

impl DeviceState {
    /// Wrap a key-value store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Device identity assigned at setup.
    pub fn device_id(&self) -> Option<String> {
        self.read(KEY_DEVICE_ID).filter(|id| !id.is_empty())
    }

    /// Whether setup (backend registration) has completed.
    pub fn setup_completed(&self) -> bool {
        self.read(KEY_SETUP_COMPLETED).as_deref() == Some("true")
    }

    /// Record a successful registration.
    pub fn mark_registered(&self, device_id: &str) -> Result<()> {
        self.store
            .set(KEY_DEVICE_ID, device_id)
            .context("Failed to persist device id")?;
        self.store
            .set(KEY_SETUP_COMPLETED, "true")
            .context("Failed to persist setup flag")
    }

    /// Derive the registration status, given the stored token.
    pub fn status(&self, tokens: &TokenStore) -> RegistrationStatus {
        if self.device_id().is_none() || !self.setup_completed() {
            return RegistrationStatus::NotRegistered;
        }
        if tokens.get().is_some() {
            RegistrationStatus::RegisteredWithToken
        } else {
            RegistrationStatus::Registered
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to read '{key}' from store: {e:#}");
                None
            }
        }
    }
}
