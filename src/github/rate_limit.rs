//! Rate-limit bookkeeping shared by every fetch in a run.
//!
//! GitHub reports quota in `X-RateLimit-*` response headers. When one fetch
//! learns that the quota is gone, every fetch must hold off until the reset
//! instant, otherwise concurrent queries keep tripping the limit. The
//! `RateLimitGate` is that shared deadline. It is passed around explicitly
//! (behind an `Arc`) and reads time through a `Clock`, so tests can run with
//! their own clock and their own gate.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::info;

/// Extra time to wait past the reported reset instant.
pub const RESET_GRACE: Duration = Duration::seconds(10);

/// Wait applied when GitHub says "rate limited" without saying until when.
pub const UNKNOWN_RESET_WAIT: Duration = Duration::seconds(60);

/// A source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A summary of the `X-RateLimit-*` headers of one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub used: Option<u64>,
    pub reset: Option<DateTime<Utc>>,
    pub resource: Option<String>,
}

impl RateLimitInfo {
    /// Reads the rate-limit headers through `lookup` (a case-insensitive
    /// header getter). Returns `None` when the response carried none.
    pub fn from_headers<'a, F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let info = RateLimitInfo {
            limit: number("x-ratelimit-limit"),
            remaining: number("x-ratelimit-remaining"),
            used: number("x-ratelimit-used"),
            reset: number("x-ratelimit-reset")
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
            resource: lookup("x-ratelimit-resource").map(str::to_string),
        };
        if info.limit.is_none() && info.remaining.is_none() && info.reset.is_none() {
            return None;
        }
        Some(info)
    }

    /// True when the quota is used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "Remaining {} rate limit: {} of {}",
            self.resource.as_deref().unwrap_or("graphql"),
            show(self.remaining),
            show(self.limit),
        )?;
        if let Some(reset) = self.reset {
            write!(f, ", next reset at {}", reset.format("%H:%M:%S"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct GateState {
    resume_at: Option<DateTime<Utc>>,
    last: Option<RateLimitInfo>,
}

/// The process-wide "nobody fetches before this instant" deadline.
#[derive(Debug)]
pub struct RateLimitGate {
    clock: Arc<dyn Clock>,
    state: Mutex<GateState>,
}

impl RateLimitGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Records the rate-limit headers of a response. An exhausted quota
    /// closes the gate until its reset.
    pub fn observe(&self, info: &RateLimitInfo) {
        let exhausted_until = info.is_exhausted().then_some(info.reset).flatten();
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last = Some(info.clone());
        if let Some(reset) = exhausted_until {
            self.hold_until(reset);
        }
    }

    /// Closes the gate until `reset` (plus grace). Never shortens an
    /// existing hold.
    pub fn hold_until(&self, reset: DateTime<Utc>) {
        let resume = reset + RESET_GRACE;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.resume_at = Some(state.resume_at.map_or(resume, |t| t.max(resume)));
    }

    /// Closes the gate for a rate-limit signal that carried no reset time.
    pub fn hold_for_unknown_reset(&self) {
        self.hold_until(self.clock.now() + UNKNOWN_RESET_WAIT - RESET_GRACE);
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resume_at
    }

    /// The most recent rate-limit summary seen by any fetch.
    pub fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    /// Suspends until the gate is open.
    ///
    /// Loops because another fetch may push the deadline further out while
    /// this one sleeps.
    pub async fn wait(&self) {
        loop {
            let Some(resume_at) = self.resume_at() else {
                return;
            };
            let now = self.clock.now();
            if resume_at <= now {
                return;
            }
            let wait = (resume_at - now).to_std().unwrap_or_default();
            info!(
                resume_at = %resume_at.format("%H:%M:%S"),
                "Waiting for rate limit to reset"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
