//! Talking to the GitHub GraphQL API.
//!
//! Key features:
//! - One shared rate-limit gate: when the quota runs out every fetch waits
//!   for the reset instead of failing
//! - Fixed-pause retry for transient failures (overload, bad gateway)
//! - Cursor pagination that the caller drives page by page
//! - Optional recording and replay of raw pages

mod cache;
mod client;
mod error;
mod fetcher;
pub mod query;
mod rate_limit;
mod retry;
mod transport;

pub use cache::{CacheMode, PageCache};
pub use client::{DEFAULT_API_ROOT, OctocrabTransport, split_api_root};
pub use error::{ApiError, ApiErrorKind};
pub use fetcher::{DEFAULT_MAX_CONCURRENCY, FetchError, Listing, Page, PageStream, PagedFetcher};
pub use query::{Query, QueryError, QueryKind};
pub use rate_limit::{
    Clock, RESET_GRACE, RateLimitGate, RateLimitInfo, SystemClock, UNKNOWN_RESET_WAIT,
};
pub use retry::{RetryConfig, RetryPolicy, RetryResult, retry_transient};
pub use transport::{GraphqlRequest, GraphqlTransport, RawResponse};
