//! The "since" instant of a digest.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Units in a fixed order, each optional: `2w`, `3d6h`, `1 week 2 days`,
/// `1.5h`. Spaces are removed before matching.
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        (?:(?P<weeks>[.\d]+)w(?:eeks?)?)?
        (?:(?P<days>[.\d]+)d(?:ays?)?)?
        (?:(?P<hours>[.\d]+)h(?:ours?)?)?
        (?:(?P<minutes>[.\d]+)m(?:in(?:utes?)?)?)?
        (?:(?P<seconds>[.\d]+)s(?:ec(?:onds?)?)?)?
        $
        ",
    )
    .expect("duration pattern is valid")
});

const UNIT_SECONDS: [(&str, f64); 5] = [
    ("weeks", 604_800.0),
    ("days", 86_400.0),
    ("hours", 3_600.0),
    ("minutes", 60.0),
    ("seconds", 1.0),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinceError {
    #[error("can't parse a time delta from {0:?}")]
    BadDuration(String),

    #[error("{0:?} reaches back before the start of time")]
    OutOfRange(String),
}

/// The point in time below which activity is not news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Cutoff {
    /// No time limit at all.
    Forever,
    Since(DateTime<Utc>),
}

impl Cutoff {
    pub fn includes(&self, timestamp: DateTime<Utc>) -> bool {
        match self {
            Cutoff::Forever => true,
            Cutoff::Since(cutoff) => timestamp >= *cutoff,
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Cutoff::Forever => None,
            Cutoff::Since(cutoff) => Some(*cutoff),
        }
    }

    /// The qualifier added to search queries, if any.
    pub fn search_term(&self) -> Option<String> {
        self.instant()
            .map(|t| format!("updated:>={}", t.format("%Y-%m-%dT%H:%M:%SZ")))
    }

    /// The value for a `$since: DateTime` query variable; `null` disables
    /// the filter.
    pub fn query_variable(&self) -> Value {
        match self.instant() {
            Some(t) => Value::String(t.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            None => Value::Null,
        }
    }

    /// A short human description.
    pub fn describe(&self) -> String {
        match self {
            Cutoff::Forever => "forever".to_string(),
            Cutoff::Since(t) => t.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

/// Parses a duration like `2 weeks`, `3d6h` or `1.5h`.
pub fn parse_duration(text: &str) -> Result<Duration, SinceError> {
    let bad = || SinceError::BadDuration(text.to_string());
    let squeezed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if squeezed.is_empty() {
        return Err(bad());
    }
    let caps = DURATION.captures(&squeezed).ok_or_else(bad)?;

    let mut seconds = 0.0;
    for (unit, scale) in UNIT_SECONDS {
        if let Some(amount) = caps.name(unit) {
            let amount: f64 = amount.as_str().parse().map_err(|_| bad())?;
            seconds += amount * scale;
        }
    }
    if !seconds.is_finite() {
        return Err(bad());
    }
    Duration::try_milliseconds((seconds * 1000.0).round() as i64).ok_or_else(bad)
}

/// Parses a `since` setting relative to `now`.
///
/// Accepts `forever`, a date (`2024-03-01` or `20240301`, midnight UTC), a
/// date and time (`2024-03-01T12:34:56`, UTC unless an offset is given), or
/// a duration before `now`.
pub fn parse_since(text: &str, now: DateTime<Utc>) -> Result<Cutoff, SinceError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("forever") {
        return Ok(Cutoff::Forever);
    }
    if let Some(instant) = parse_instant(trimmed) {
        return Ok(Cutoff::Since(instant));
    }
    let delta = parse_duration(trimmed)?;
    now.checked_sub_signed(delta)
        .map(Cutoff::Since)
        .ok_or_else(|| SinceError::OutOfRange(text.to_string()))
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(t.and_utc());
    }
    let date = if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        NaiveDate::parse_from_str(text, "%Y%m%d").ok()?
    } else {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?
    };
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}
