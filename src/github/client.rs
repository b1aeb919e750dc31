//! Octocrab-backed GraphQL transport.
//!
//! Octocrab's typed `graphql` helper turns every non-success status into an
//! opaque error and drops the response headers, so this wrapper posts through
//! the raw `_post` call and keeps status, headers and body for the fetcher.

use octocrab::Octocrab;
use serde_json::Value;

use super::error::ApiError;
use super::rate_limit::RateLimitInfo;
use super::transport::{GraphqlRequest, GraphqlTransport, RawResponse};

/// The public GitHub GraphQL endpoint.
pub const DEFAULT_API_ROOT: &str = "https://api.github.com/graphql";

/// A GraphQL transport over an authenticated octocrab client.
#[derive(Clone)]
pub struct OctocrabTransport {
    /// The underlying octocrab client, with its base URI set to the API host.
    client: Octocrab,

    /// The GraphQL endpoint path on that host.
    path: String,
}

impl OctocrabTransport {
    /// Creates a transport from a pre-configured octocrab client.
    pub fn new(client: Octocrab, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Creates a transport that authenticates with a bearer token.
    ///
    /// `api_root` is the full GraphQL endpoint, e.g.
    /// `https://github.example.com/api/graphql` for GitHub Enterprise.
    pub fn from_token(token: impl Into<String>, api_root: &str) -> Result<Self, ApiError> {
        let (base, path) = split_api_root(api_root).ok_or_else(|| {
            ApiError::permanent(format!("Can't understand api_root {api_root:?}"))
        })?;
        let client = Octocrab::builder()
            .personal_token(token.into())
            .base_uri(base)
            .map_err(ApiError::from_octocrab)?
            .build()
            .map_err(ApiError::from_octocrab)?;
        Ok(Self::new(client, path))
    }
}

impl std::fmt::Debug for OctocrabTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabTransport")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl GraphqlTransport for OctocrabTransport {
    async fn send(&self, request: &GraphqlRequest) -> Result<RawResponse, ApiError> {
        let response = self
            .client
            ._post(self.path.as_str(), Some(request))
            .await
            .map_err(ApiError::from_octocrab)?;

        let status = response.status().as_u16();
        let rate_limit = RateLimitInfo::from_headers(|name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        });

        let text = self
            .client
            .body_to_string(response)
            .await
            .map_err(ApiError::from_octocrab)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(RawResponse {
            status,
            rate_limit,
            body,
        })
    }
}

/// Splits a GraphQL endpoint URL into the host part octocrab uses as its base
/// URI and the path that is posted to.
pub fn split_api_root(api_root: &str) -> Option<(String, String)> {
    let (scheme, rest) = api_root.trim().split_once("://")?;
    if scheme.is_empty() || rest.is_empty() {
        return None;
    }
    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/graphql"),
    };
    if host.is_empty() {
        return None;
    }
    Some((format!("{scheme}://{host}"), path.to_string()))
}
