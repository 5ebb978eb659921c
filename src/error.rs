//! Failure taxonomy for the push token lifecycle.
//!
//! Every public operation catches these at its boundary and converts them
//! into a boolean, an `Option`, a report or a user-facing notice. The enum
//! exists so that the retry loop and the settings actions can tell the
//! categories apart.

/// Categorized failure of a push lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Notification permission is not granted; the user must act in system
    /// settings.
    PermissionDenied,
    /// No push token could be obtained (missing project id or platform
    /// failure). Re-invoking later may succeed.
    TokenUnavailable(String),
    /// Transport-level failure (connect error, timeout, reset).
    Network(String),
    /// The server answered but did not acknowledge the request: non-2xx
    /// status or `success: false` in the body.
    Application {
        /// HTTP status code of the response.
        status: u16,
        /// Server-provided message, if any.
        message: Option<String>,
    },
    /// A success response whose body is not the expected JSON.
    MalformedResponse(String),
    /// The operation was aborted through its cancellation token.
    Cancelled,
    /// A single-slot subscription is already held by another subscriber.
    SlotOccupied,
}

impl PushError {
    /// Whether the token update loop should try again after this failure.
    ///
    /// Application failures are retried exactly like network failures;
    /// malformed bodies, cancellation and permission problems are terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenUnavailable(_) | Self::Network(_) | Self::Application { .. }
        )
    }

    /// Server-provided message for application failures.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Application { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "Notification permission denied"),
            Self::TokenUnavailable(msg) => write!(f, "Push token unavailable: {msg}"),
            Self::Network(msg) => write!(f, "Network failure: {msg}"),
            Self::Application {
                status,
                message: Some(msg),
            } => write!(f, "Server rejected request ({status}): {msg}"),
            Self::Application {
                status,
                message: None,
            } => write!(f, "Server rejected request ({status})"),
            Self::MalformedResponse(msg) => write!(f, "Malformed server response: {msg}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::SlotOccupied => write!(f, "Handler slot already occupied"),
        }
    }
}

impl std::error::Error for PushError {}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
