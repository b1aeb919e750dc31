//! Paginated, rate-limit-aware GraphQL fetching.
//!
//! `PagedFetcher::execute` runs one request to completion:
//! - waits while the shared `RateLimitGate` is closed
//! - sends through the transport, at most `max_concurrency` at a time
//! - on a rate-limit signal, closes the gate until the reset and sends the
//!   same request again (not counted as a retry)
//! - on a transient failure, pauses and retries a bounded number of times
//! - on anything else, fails at once with the query synopsis attached
//!
//! When one response carries both a rate-limit signal and a transient
//! status, the rate limit wins: waiting for the reset also clears the
//! overload.
//!
//! `PageStream` pulls pages one at a time by following `endCursor`, so a
//! caller can stop early without fetching the rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::cache::PageCache;
use super::error::{ApiError, ApiErrorKind};
use super::query::Query;
use super::rate_limit::RateLimitGate;
use super::retry::{RetryConfig, RetryPolicy, RetryResult, retry_transient};
use super::transport::{GraphqlRequest, GraphqlTransport, RawResponse};

/// How many requests may be in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// GraphQL error types that the user can fix, with the advice to give.
const USER_FIXABLE_ERROR_TYPES: &[(&str, &str)] =
    &[("INSUFFICIENT_SCOPES", "Insufficient GitHub token scope.")];

/// A fatal fetch failure, naming the query that failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source} (while running {synopsis}). Check the GITHUB_TOKEN environment variable.")]
    Unauthorized {
        synopsis: String,
        #[source]
        source: ApiError,
    },

    #[error("gave up on {synopsis} after {attempts} attempts: {source}")]
    RetriesExhausted {
        synopsis: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("{synopsis} failed: {source}")]
    Api {
        synopsis: String,
        #[source]
        source: ApiError,
    },

    #[error("query returned no data, you may need more permissions in your token: {synopsis}")]
    NoData { synopsis: String },
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }
}

/// What a single response amounted to.
#[derive(Debug)]
enum Outcome {
    Data(Value),
    RateLimited { reset: Option<DateTime<Utc>> },
}

/// Executes GraphQL queries with retrying, rate limiting and pagination.
pub struct PagedFetcher<T> {
    transport: T,
    gate: Arc<RateLimitGate>,
    permits: Semaphore,
    retry: RetryConfig,
    policy: RetryPolicy,
    cache: Option<PageCache>,
}

impl<T> std::fmt::Debug for PagedFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFetcher")
            .field("retry", &self.retry)
            .field("policy", &self.policy)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<T: GraphqlTransport> PagedFetcher<T> {
    pub fn new(transport: T, gate: Arc<RateLimitGate>) -> Self {
        Self {
            transport,
            gate,
            permits: Semaphore::new(DEFAULT_MAX_CONCURRENCY),
            retry: RetryConfig::DEFAULT,
            policy: RetryPolicy::RetryTransient,
            cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.permits = Semaphore::new(max_concurrency.max(1));
        self
    }

    pub fn with_cache(mut self, cache: PageCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one request and returns its `data`.
    pub async fn execute(
        &self,
        query: &Query,
        variables: &Map<String, Value>,
    ) -> Result<Value, FetchError> {
        let request = GraphqlRequest {
            query: query.text().to_string(),
            variables: variables.clone(),
        };
        let synopsis = query.synopsis(variables);

        if let Some(data) = self.cache.as_ref().and_then(|c| c.load(&request)) {
            return Ok(data);
        }

        debug!(query = %synopsis, "Executing query");
        let data = match retry_transient(self.retry, self.policy, || self.attempt(&request)).await
        {
            RetryResult::Success(data) => data,
            RetryResult::ExhaustedRetries {
                last_error,
                attempts,
            } => {
                return Err(FetchError::RetriesExhausted {
                    synopsis,
                    attempts,
                    source: last_error,
                });
            }
            RetryResult::PermanentError(e) if e.kind == ApiErrorKind::Unauthorized => {
                return Err(FetchError::Unauthorized {
                    synopsis,
                    source: e,
                });
            }
            RetryResult::PermanentError(e) => {
                return Err(FetchError::Api {
                    synopsis,
                    source: e,
                });
            }
        };

        if let Some(cache) = &self.cache {
            cache.store(&request, &data);
        }
        Ok(data)
    }

    /// Starts a pull-based walk over the pages of a paginated query.
    ///
    /// `variables` must not include `after`; the stream manages the cursor.
    pub fn pages<'a>(&'a self, query: &'a Query, variables: Map<String, Value>) -> PageStream<'a, T> {
        PageStream {
            fetcher: self,
            query,
            variables,
            state: PageState::Start,
        }
    }

    /// One request, waiting out any rate limiting. Transient failures are
    /// returned for `retry_transient` to deal with.
    async fn attempt(&self, request: &GraphqlRequest) -> Result<Value, ApiError> {
        loop {
            self.gate.wait().await;

            let response = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ApiError::permanent("fetcher is shut down"))?;
                self.transport.send(request).await?
            };

            if let Some(info) = &response.rate_limit {
                self.gate.observe(info);
            }

            match classify(response)? {
                Outcome::Data(data) => return Ok(data),
                Outcome::RateLimited { reset } => {
                    match reset {
                        Some(reset) => self.gate.hold_until(reset),
                        None => self.gate.hold_for_unknown_reset(),
                    }
                    info!(
                        reset = ?reset.map(|r| r.format("%H:%M:%S").to_string()),
                        "Rate limited, will retry after reset"
                    );
                }
            }
        }
    }
}

/// Decides what a response means.
fn classify(response: RawResponse) -> Result<Outcome, ApiError> {
    let exhausted = response
        .rate_limit
        .as_ref()
        .is_some_and(|info| info.is_exhausted());
    let reset = response.rate_limit.as_ref().and_then(|info| info.reset);
    let error_type = first_error(&response.body)
        .and_then(|err| err.get("type"))
        .and_then(Value::as_str);

    if error_type == Some("RATE_LIMITED")
        || response.status == 429
        || (exhausted && !response.is_success())
    {
        return Ok(Outcome::RateLimited { reset });
    }

    if !response.is_success() {
        return Err(ApiError::from_status(
            response.status,
            failure_message(&response.body),
        ));
    }

    extract_data(response.body).map(Outcome::Data)
}

fn first_error(body: &Value) -> Option<&Value> {
    body.get("errors").and_then(|errors| errors.get(0))
}

/// A short message for a failed HTTP response.
fn failure_message(body: &Value) -> String {
    match body {
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Value::String(text) => text.chars().take(200).collect(),
        other => other.to_string(),
    }
}

/// Turns a successful HTTP response body into its `data`, or a useful error.
fn extract_data(body: Value) -> Result<Value, ApiError> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::permanent(format!(
            "unexpected response body: {}",
            failure_message(&body)
        )));
    };

    if let Some(message) = map.get("message").and_then(Value::as_str) {
        return Err(ApiError::permanent(message.to_string()));
    }

    if let Some(err) = map.get("errors").and_then(|errors| errors.get(0)) {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        let error_type = err.get("type").and_then(Value::as_str).unwrap_or("");
        if let Some((_, advice)) = USER_FIXABLE_ERROR_TYPES
            .iter()
            .find(|(kind, _)| *kind == error_type)
        {
            return Err(ApiError::unauthorized(format!("{advice} {message}")));
        }

        let mut msg = format!("GraphQL error: {message}");
        if let Some(path) = err.get("path").and_then(Value::as_array) {
            let path: Vec<String> = path
                .iter()
                .map(|p| p.as_str().map_or_else(|| p.to_string(), str::to_string))
                .collect();
            msg.push_str(&format!(" @{}", path.join(".")));
        }
        if let Some(loc) = err
            .get("locations")
            .and_then(|locs| locs.get(0))
        {
            let line = loc.get("line").and_then(Value::as_u64).unwrap_or(0);
            let column = loc.get("column").and_then(Value::as_u64).unwrap_or(0);
            msg.push_str(&format!(", line {line} column {column}"));
        }
        debug!(errors = %map.get("errors").cloned().unwrap_or_default(), "GraphQL error data");
        return Err(ApiError::permanent(msg));
    }

    match map.remove("data") {
        Some(Value::Null) | None => Err(ApiError::permanent("GraphQL query returned null")),
        Some(data) => Ok(data),
    }
}

/// One page of a paginated connection.
#[derive(Debug, Clone)]
pub struct Page {
    /// The whole `data` of the response, for the fields around the
    /// connection (repository URL, project title, ...).
    pub data: Value,
    pub nodes: Vec<Value>,
    /// `totalCount` (or `issueCount` for searches), when selected.
    pub total_count: Option<u64>,
}

/// All pages of a connection, gathered.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// The first page's `data`.
    pub data: Option<Value>,
    pub nodes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageState {
    Start,
    After(String),
    Done,
}

/// A pull-based sequence of pages.
pub struct PageStream<'a, T> {
    fetcher: &'a PagedFetcher<T>,
    query: &'a Query,
    variables: Map<String, Value>,
    state: PageState,
}

impl<T: GraphqlTransport> PageStream<'_, T> {
    /// Fetches the next page, or returns `None` once the API reports no more.
    pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
        let cursor = match &self.state {
            PageState::Done => return Ok(None),
            PageState::Start => None,
            PageState::After(cursor) => Some(cursor.clone()),
        };
        match &cursor {
            Some(c) => self
                .variables
                .insert("after".to_string(), Value::String(c.clone())),
            None => self.variables.remove("after"),
        };

        let data = self.fetcher.execute(self.query, &self.variables).await?;
        let Some(connection) = self.query.connection_in(&data) else {
            self.state = PageState::Done;
            return Err(FetchError::NoData {
                synopsis: self.query.synopsis(&self.variables),
            });
        };

        let page_info = connection.get("pageInfo");
        let has_next = page_info
            .and_then(|p| p.get("hasNextPage"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let end_cursor = page_info
            .and_then(|p| p.get("endCursor"))
            .and_then(Value::as_str);
        let nodes = connection
            .get("nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total_count = connection
            .get("totalCount")
            .or_else(|| connection.get("issueCount"))
            .and_then(Value::as_u64);

        self.state = match end_cursor {
            Some(next) if has_next && cursor.as_deref() == Some(next) => {
                warn!(
                    query = %self.query.synopsis(&self.variables),
                    "Pagination cursor did not advance; stopping"
                );
                PageState::Done
            }
            Some(next) if has_next => PageState::After(next.to_string()),
            _ => PageState::Done,
        };

        Ok(Some(Page {
            data,
            nodes,
            total_count,
        }))
    }

    /// Pulls every remaining page.
    pub async fn collect(mut self) -> Result<Listing, FetchError> {
        let mut listing = Listing::default();
        while let Some(page) = self.next_page().await? {
            listing.nodes.extend(page.nodes);
            if listing.data.is_none() {
                listing.data = Some(page.data);
            }
        }
        Ok(listing)
    }
}
