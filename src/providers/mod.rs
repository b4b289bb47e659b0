//! External service clients.
//!
//! - [`auth`] - OAuth2 token acquisition and caching
//! - [`graph`] - Microsoft Graph mail API client and wire types
//! - [`http`] - The transport seam both of the above send requests through

pub mod auth;
mod error;
pub mod graph;
pub mod http;

pub use auth::{AccessTokenProvider, Credential, StaticToken, TokenManager};
pub use error::{GraphError, Result, TokenStep};
pub use graph::GraphClient;
#[cfg(test)]
pub use http::MockHttpTransport;
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody};
