//! OAuth2 token lifecycle.
//!
//! [`TokenManager`] owns one [`Credential`] and its cached [`TokenState`].
//! The whole "check validity, acquire or refresh, store" sequence runs under
//! one async mutex, so concurrent callers share a single in-flight request
//! instead of racing the token endpoint.
//!
//! # Grant selection
//!
//! ```text
//! valid cached token ──────────────────────────────► return it
//! refresh token held ──► refresh grant ──ok────────► store, return
//!                              └──error──► client credentials (once) ──► store | error
//! no refresh token ───► client credentials ────────► store | error
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Method;
use tokio::sync::Mutex;

use super::token::{
    Credential, IssuedToken, TokenErrorBody, TokenSnapshot, TokenState, DEFAULT_AUTHORITY,
    GRAPH_DEFAULT_SCOPE,
};
use crate::providers::{GraphError, HttpRequest, HttpResponse, HttpTransport, Result, TokenStep};

/// Source of the current time, injectable for expiry tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Anything that can hand out a bearer token for the mail API.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Returns a token usable right now.
    async fn access_token(&self) -> Result<String>;
}

/// A pre-issued access token used verbatim (`auth_method = token`).
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a pre-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"[REDACTED]").finish()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            return Err(GraphError::Configuration(
                "Access token is required".to_string(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// Lifecycle notifications emitted by [`TokenManager`].
#[derive(Debug)]
pub enum TokenEvent<'a> {
    /// A cached token was still valid.
    CacheHit {
        /// Expiry of the cached token.
        expires_at: Option<DateTime<Utc>>,
    },
    /// A token request is about to be sent.
    Requesting {
        /// Grant being used.
        step: TokenStep,
    },
    /// The provider issued a token.
    Issued {
        /// Grant that succeeded.
        step: TokenStep,
        /// Expiry of the new token.
        expires_at: Option<DateTime<Utc>>,
        /// Whether a new refresh token replaced the old one.
        rotated_refresh_token: bool,
    },
    /// A token request failed.
    Failed {
        /// Grant that failed.
        step: TokenStep,
        /// The failure.
        error: &'a GraphError,
    },
    /// The refresh grant failed; falling back to client credentials.
    FallingBack {
        /// The refresh failure.
        error: &'a GraphError,
    },
}

/// Diagnostic hook for token lifecycle events.
pub trait TokenObserver: Send + Sync {
    /// Called for every lifecycle event.
    fn observe(&self, event: &TokenEvent<'_>);
}

/// [`TokenObserver`] that writes `tracing` events.
///
/// With `verbose` set, cache hits and outgoing requests are logged too.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    /// Logs issued tokens and failures only.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Also logs cache hits and outgoing requests.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl TokenObserver for TracingObserver {
    fn observe(&self, event: &TokenEvent<'_>) {
        match event {
            TokenEvent::CacheHit { expires_at } if self.verbose => {
                tracing::debug!(?expires_at, "Using cached access token");
            }
            TokenEvent::Requesting { step } if self.verbose => {
                tracing::debug!(%step, "Requesting access token");
            }
            TokenEvent::Issued {
                step,
                expires_at,
                rotated_refresh_token,
            } => {
                tracing::info!(%step, ?expires_at, rotated_refresh_token, "Access token issued");
            }
            TokenEvent::Failed { step, error } => {
                tracing::warn!(%step, error = %error, "Token request failed");
            }
            TokenEvent::FallingBack { error } => {
                tracing::warn!(
                    error = %error,
                    "Refresh grant failed, falling back to client credentials"
                );
            }
            _ => {}
        }
    }
}

/// Keeps one credential set's access token valid.
///
/// # Example
///
/// ```ignore
/// let manager = TokenManager::new(
///     Credential::new(client_id, client_secret, tenant_id),
///     Arc::new(ReqwestTransport::new()),
/// );
/// let token = manager.get_access_token().await?;
/// ```
pub struct TokenManager {
    /// Application credentials.
    credential: Credential,
    /// Network seam for token requests.
    transport: Arc<dyn HttpTransport>,
    /// Identity provider root URL.
    authority: String,
    /// Scope requested by the client-credentials grant.
    scope: String,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Diagnostic hook.
    observer: Arc<dyn TokenObserver>,
    /// Cached token, guarded for the whole acquire sequence.
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Creates a manager with no cached token.
    ///
    /// A refresh token present in `credential` seeds the state.
    pub fn new(credential: Credential, transport: Arc<dyn HttpTransport>) -> Self {
        let state = TokenState::new(credential.refresh_token.clone());
        Self {
            credential,
            transport,
            authority: DEFAULT_AUTHORITY.to_string(),
            scope: GRAPH_DEFAULT_SCOPE.to_string(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver::new()),
            state: Mutex::new(state),
        }
    }

    /// Overrides the identity provider root URL.
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Overrides the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the diagnostic hook.
    pub fn with_observer(mut self, observer: Arc<dyn TokenObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Seeds the cache with a previously issued token.
    pub fn with_cached_token(
        mut self,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let state = self.state.get_mut();
        state.access_token = access_token.into();
        state.expires_at = Some(expires_at);
        self
    }

    /// Returns the credentials this manager was built with.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Returns a secret-free view of the cached state.
    pub async fn snapshot(&self) -> TokenSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Returns a valid access token, acquiring or refreshing it if needed.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Configuration`] if client_id, client_secret or tenant_id
    ///   is empty; no request is made.
    /// - [`GraphError::OAuth`] / [`GraphError::Transport`] from the last grant
    ///   attempted. When a refresh fails and the fallback acquisition also
    ///   fails, the acquisition error is returned.
    pub async fn get_access_token(&self) -> Result<String> {
        self.credential.validate()?;

        let mut state = self.state.lock().await;
        if state.is_valid_at(self.clock.now()) {
            self.observer.observe(&TokenEvent::CacheHit {
                expires_at: state.expires_at,
            });
            return Ok(state.access_token.clone());
        }

        let refresh_token = state.refresh_token().map(str::to_owned);
        let (step, issued) = match refresh_token {
            Some(refresh_token) => {
                match self
                    .request_token(TokenStep::Refresh, Some(&refresh_token))
                    .await
                {
                    Ok(issued) => (TokenStep::Refresh, issued),
                    Err(error) => {
                        self.observer.observe(&TokenEvent::FallingBack { error: &error });
                        let issued = self.request_token(TokenStep::Acquire, None).await?;
                        (TokenStep::Acquire, issued)
                    }
                }
            }
            None => {
                let issued = self.request_token(TokenStep::Acquire, None).await?;
                (TokenStep::Acquire, issued)
            }
        };

        let rotated_refresh_token = state.store(issued, self.clock.now());
        self.observer.observe(&TokenEvent::Issued {
            step,
            expires_at: state.expires_at,
            rotated_refresh_token,
        });

        Ok(state.access_token.clone())
    }

    /// Sends one grant request to the tenant token endpoint.
    async fn request_token(
        &self,
        step: TokenStep,
        refresh_token: Option<&str>,
    ) -> Result<IssuedToken> {
        self.observer.observe(&TokenEvent::Requesting { step });

        let result = self.send_grant(step, refresh_token).await;
        if let Err(error) = &result {
            self.observer.observe(&TokenEvent::Failed { step, error });
        }
        result
    }

    async fn send_grant(
        &self,
        step: TokenStep,
        refresh_token: Option<&str>,
    ) -> Result<IssuedToken> {
        let mut form = vec![
            ("grant_type", step.grant_type().to_string()),
            ("client_id", self.credential.client_id.clone()),
            ("client_secret", self.credential.client_secret.clone()),
        ];
        match (step, refresh_token) {
            (TokenStep::Refresh, Some(token)) => form.push(("refresh_token", token.to_string())),
            _ => form.push(("scope", self.scope.clone())),
        }

        let request = HttpRequest::new(Method::POST, self.credential.token_url(&self.authority))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(form);

        let response = self.transport.execute(request).await.map_err(|e| match e {
            GraphError::Transport(msg) => {
                GraphError::Transport(format!("token {} request: {}", step, msg))
            }
            other => other,
        })?;

        if !response.is_success() {
            return Err(self.rejection(step, &response));
        }

        IssuedToken::decode(&response.body).map_err(|description| GraphError::OAuth {
            step,
            status: Some(response.status.as_u16()),
            code: None,
            description,
        })
    }

    /// Builds the error for a non-2xx token response.
    fn rejection(&self, step: TokenStep, response: &HttpResponse) -> GraphError {
        let (code, description) = match TokenErrorBody::parse(&response.body) {
            Some(parsed) => (parsed.error, parsed.error_description.unwrap_or_default()),
            None if response.body.trim().is_empty() => (None, response.status_message()),
            None => (None, response.body.trim().to_string()),
        };

        GraphError::OAuth {
            step,
            status: Some(response.status.as_u16()),
            code,
            description: self.scrub(&description),
        }
    }

    /// Removes the client secret from provider-supplied text.
    fn scrub(&self, text: &str) -> String {
        let secret = self.credential.client_secret.trim();
        if secret.is_empty() {
            text.to_string()
        } else {
            text.replace(secret, "[REDACTED]")
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("credential", &self.credential)
            .field("authority", &self.authority)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}
