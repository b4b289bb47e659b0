//! Credential and token state types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::providers::{GraphError, Result};

/// Identity provider root used to build tenant token URLs.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope requested by the client-credentials grant.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Application credentials for one tenant.
///
/// Immutable once handed to a [`TokenManager`](super::TokenManager). The
/// refresh token here only seeds the manager's state; rotated refresh tokens
/// live in [`TokenState`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Application (client) ID.
    pub client_id: String,
    /// Application secret.
    pub client_secret: String,
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Delegated refresh token, if one was issued out of band.
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Creates credentials without a refresh token.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
            refresh_token: None,
        }
    }

    /// Sets the refresh token; blank values are treated as absent.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        let token = refresh_token.into();
        self.refresh_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    /// Checks that client_id, client_secret and tenant_id are all present.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("tenant_id", &self.tenant_id),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Configuration(format!(
                "missing OAuth credentials: {}",
                missing.join(", ")
            )))
        }
    }

    /// Returns the v2.0 token endpoint for this tenant.
    pub fn token_url(&self, authority: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            self.tenant_id.trim()
        )
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Cached token owned by one token manager.
#[derive(Clone, Default)]
pub struct TokenState {
    /// Current access token; empty before the first acquisition.
    pub access_token: String,
    /// Refresh token, possibly rotated by the provider.
    pub refresh_token: Option<String>,
    /// Instant after which `access_token` must not be used.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// Creates an empty state seeded with an optional refresh token.
    pub fn new(refresh_token: Option<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
            expires_at: None,
        }
    }

    /// A token is valid iff it is non-empty and `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at.is_some_and(|at| now < at)
    }

    /// Returns the refresh token when one is held and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// Stores a freshly issued token. Returns true if the refresh token rotated.
    pub fn store(&mut self, issued: IssuedToken, now: DateTime<Utc>) -> bool {
        self.access_token = issued.access_token;
        self.expires_at = Some(now + Duration::seconds(issued.expires_in_secs));

        match issued.refresh_token {
            Some(rotated) if Some(rotated.as_str()) != self.refresh_token.as_deref() => {
                self.refresh_token = Some(rotated);
                true
            }
            _ => false,
        }
    }

    /// Returns a secret-free view of this state.
    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            has_access_token: !self.access_token.is_empty(),
            expires_at: self.expires_at,
            has_refresh_token: self.refresh_token().is_some(),
        }
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Secret-free summary of a [`TokenState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSnapshot {
    /// Whether an access token has ever been stored.
    pub has_access_token: bool,
    /// Expiry of the stored access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether a refresh token is held.
    pub has_refresh_token: bool,
}

/// A token as issued by the provider, normalized from the response body.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// New access token.
    pub access_token: String,
    /// Rotated refresh token, if the provider returned one.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in_secs: i64,
}

impl IssuedToken {
    /// Decodes a successful token response body.
    ///
    /// `expires_in` may be a number or a numeric string; when absent or
    /// unreadable it defaults to [`DEFAULT_EXPIRES_IN_SECS`].
    pub fn decode(body: &str) -> std::result::Result<Self, String> {
        let raw: RawTokenResponse =
            serde_json::from_str(body).map_err(|e| format!("malformed token response: {}", e))?;

        if raw.access_token.is_empty() {
            return Err("token response missing access_token".to_string());
        }

        let expires_in_secs = match raw.expires_in {
            Some(ExpiresIn::Seconds(secs)) => secs,
            Some(ExpiresIn::Text(text)) => text
                .trim()
                .parse()
                .unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            None => DEFAULT_EXPIRES_IN_SECS,
        };

        Ok(Self {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
            expires_in_secs,
        })
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

/// Token endpoint success body.
#[derive(Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<ExpiresIn>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

/// Token endpoint error body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenErrorBody {
    /// Parses a provider error body; `None` when it is not structured JSON.
    pub(crate) fn parse(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        if parsed.error.is_none() && parsed.error_description.is_none() {
            return None;
        }
        Some(parsed)
    }
}
