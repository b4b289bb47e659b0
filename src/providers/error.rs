//! Error taxonomy for token and mail API operations.

use std::fmt;

/// Result type alias for provider and service operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Which token request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStep {
    /// Client-credentials acquisition.
    Acquire,
    /// Refresh-token exchange.
    Refresh,
}

impl TokenStep {
    /// Returns the OAuth2 `grant_type` used by this step.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::Acquire => "client_credentials",
            Self::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire => f.write_str("acquire"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Errors that can occur while talking to the identity provider or mail API.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A required setting is missing or invalid; raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The identity provider rejected a grant.
    #[error("oauth {step} failed{}: {}", fmt_status(.status), fmt_oauth(.code, .description))]
    OAuth {
        /// The failing step.
        step: TokenStep,
        /// HTTP status, when the provider answered at all.
        status: Option<u16>,
        /// Provider error code (`invalid_client`, ...), when parseable.
        code: Option<String>,
        /// Provider description or raw body.
        description: String,
    },

    /// Network-level failure: no HTTP response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response from the mail API.
    #[error("API error ({status} {message}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Canonical status message.
        message: String,
        /// Raw response body.
        body: String,
    },

    /// Non-2xx response to a send request.
    #[error("delivery failed ({status} {message}): {body}")]
    Delivery {
        /// HTTP status code.
        status: u16,
        /// Canonical status message.
        message: String,
        /// Raw response body.
        body: String,
    },

    /// A provider payload could not be decoded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::OAuth { status, .. } => *status,
            Self::Api { status, .. } | Self::Delivery { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true when the next scheduled invocation may succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } | Self::Delivery { status, .. } => {
                *status == 429 || *status >= 500
            }
            Self::OAuth { status, .. } => status.map_or(true, |s| s >= 500),
            Self::Configuration(_) | Self::Internal(_) => false,
        }
    }

    /// Turns an API error into a delivery error; other variants pass through.
    pub fn into_delivery(self) -> Self {
        match self {
            Self::Api {
                status,
                message,
                body,
            } => Self::Delivery {
                status,
                message,
                body,
            },
            other => other,
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" ({})", status),
        None => String::new(),
    }
}

fn fmt_oauth(code: &Option<String>, description: &str) -> String {
    match code {
        Some(code) if description.is_empty() => code.clone(),
        Some(code) => format!("{}: {}", code, description),
        None => description.to_string(),
    }
}
