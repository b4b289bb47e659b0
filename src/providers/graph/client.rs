//! Authenticated Microsoft Graph requests.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::providers::{
    AccessTokenProvider, GraphError, HttpRequest, HttpTransport, RequestBody, Result,
};

/// Production Graph API root.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// A 2xx response from the Graph API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body (may be empty, e.g. `202 Accepted` from sendMail).
    pub body: String,
}

impl ApiResponse {
    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| GraphError::Internal(format!("decode response: {}", e)))
    }
}

/// Thin Graph client: one attempt per call, bearer token attached.
///
/// Any non-2xx status comes back as [`GraphError::Api`] with the status,
/// its canonical message and the raw body.
#[derive(Clone)]
pub struct GraphClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
}

impl GraphClient {
    /// Creates a client against the production Graph endpoint.
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            transport,
            tokens,
            base_url: GRAPH_API_BASE.to_string(),
        }
    }

    /// Overrides the API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Makes an authenticated GET request.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        let query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.send(Method::GET, path, query, RequestBody::Empty).await
    }

    /// Makes an authenticated POST request with a JSON body.
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let body = Self::encode(body)?;
        self.send(Method::POST, path, Vec::new(), body).await
    }

    /// Makes an authenticated PATCH request with a JSON body.
    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let body = Self::encode(body)?;
        self.send(Method::PATCH, path, Vec::new(), body).await
    }

    fn encode<B: Serialize>(body: &B) -> Result<RequestBody> {
        serde_json::to_value(body)
            .map(RequestBody::Json)
            .map_err(|e| GraphError::Internal(format!("encode request: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: RequestBody,
    ) -> Result<ApiResponse> {
        let token = self.tokens.access_token().await?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| GraphError::Internal(format!("invalid header: {}", e)))?;
        bearer.set_sensitive(true);

        let mut request = HttpRequest::new(method, self.url(path))
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.query = query;
        request.body = body;

        tracing::debug!(method = %request.method, url = %request.url, "Graph request");

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(GraphError::Api {
                status: response.status.as_u16(),
                message: response.status_message(),
                body: response.body,
            });
        }

        Ok(ApiResponse {
            status: response.status.as_u16(),
            body: response.body,
        })
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
