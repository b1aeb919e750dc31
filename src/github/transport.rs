//! The seam between the fetcher and the network.
//!
//! A transport sends one GraphQL request and hands back the status, the
//! rate-limit headers and the decoded body, without judging any of them.
//! Classification (retry, wait, fail) belongs to the fetcher, so a scripted
//! transport in tests exercises exactly the production decision logic.

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ApiError;
use super::rate_limit::RateLimitInfo;

/// One GraphQL POST body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

/// What came back from the server, undigested.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub rate_limit: Option<RateLimitInfo>,
    /// The decoded JSON body, or the body text as a JSON string when it was
    /// not JSON (gateway error pages).
    pub body: Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends GraphQL requests.
///
/// Only transport-level failures (no response at all) are errors here.
pub trait GraphqlTransport: Send + Sync {
    fn send(
        &self,
        request: &GraphqlRequest,
    ) -> impl Future<Output = Result<RawResponse, ApiError>> + Send;
}
