//! Pushlink - push notification subsystem.
//!
//! This crate manages a device's push token lifecycle, keeps the backend
//! informed of the current token, and routes incoming notifications to an
//! in-app banner or a tap handler.
//!
//! # Architecture
//!
//! - **TokenProvider** - Permission prompt and token issuance through the
//!   platform capability
//! - **TokenStore** - Persisted current token (keyring or file backed)
//! - **BackendClient** - Device registration and token updates, with retry
//! - **NotificationRouter** - Platform event streams to application handlers
//! - **Banner** - Single in-app banner with auto-dismiss
//! - **PushService** - Composition root owning all of the above
//!
//! # Modules
//!
//! - [`service`] - The push service and its settings actions
//! - [`server`] - Backend API client
//! - [`platform`] - Platform capability trait and the static platform
//! - [`config`] - Configuration loading/saving

pub mod banner;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod keyring;
pub mod notifications;
pub mod platform;
pub mod provider;
pub mod router;
pub mod server;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use banner::{Banner, BannerPhase, BannerState, SharedBanner};
pub use config::Config;
pub use error::PushError;
pub use notifications::{NotificationData, NotificationEvent, PlatformNotification};
pub use platform::{PermissionStatus, PushPlatform, SharedPlatform, StaticPlatform};
pub use provider::TokenProvider;
pub use router::{HandlerSubscription, ListenerHandle, NotificationRouter};
pub use server::{BackendClient, DeviceProfile, RetryPolicy, TokenUpdateReport, UpdateStatus};
pub use service::{Notice, NoticeLevel, PushService, StartupReport};
pub use store::{RegistrationStatus, SharedStore, TokenStore};
