//! OAuth2 client-credentials and refresh-token handling.

mod manager;
mod token;

pub use manager::{
    AccessTokenProvider, Clock, StaticToken, SystemClock, TokenEvent, TokenManager, TokenObserver,
    TracingObserver,
};
pub use token::{
    Credential, IssuedToken, TokenSnapshot, TokenState, DEFAULT_AUTHORITY,
    DEFAULT_EXPIRES_IN_SECS, GRAPH_DEFAULT_SCOPE,
};
