//! Backend communication module for pushlink.
//!
//! This module provides everything needed to reconcile the local push token
//! with the backend:
//!
//! - HTTP client for the backend API (`BackendClient`)
//! - Request/response data types (`DeviceProfile`, `ApiResponse`, ...)
//! - Token update retry schedule (`RetryPolicy`, `TokenUpdateReport`)
//!
//! # Endpoints
//!
//! ```text
//! POST /api/users/register     register a device with its push token
//! PUT  /api/users/{deviceId}   record a new push token
//! POST /api/v1/fcm/send        ask the backend to push a test notification
//! ```
//!
//! # Modules
//!
//! - [`client`] - HTTP client
//! - [`types`] - Request/response data types
//! - [`retry`] - Retry policy and reports

pub mod client;
pub mod retry;
pub mod types;

pub use client::BackendClient;
pub use retry::{RetryPolicy, TokenUpdateReport, UpdateStatus};
pub use types::{ApiResponse, DeviceProfile, ServerRecord};
