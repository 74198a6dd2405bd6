//! Retry-after extraction from completed responses.
//!
//! `Retry-After` comes either as delta-seconds or as an HTTP-date. Dates are
//! turned into the time remaining from now; a date in the past means
//! "retry immediately".

use chrono::{DateTime, Utc};
use http::header::RETRY_AFTER;
use http::HeaderMap;
use std::time::Duration;

/// Read the `Retry-After` header, if present and well-formed
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// Parse a `Retry-After` value
///
/// Supports `"120"`, fractional seconds like `"1.5"`, and HTTP-dates like
/// `"Wed, 21 Oct 2015 07:28:00 GMT"`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&Utc) - now;
    Some(remaining.to_std().unwrap_or(Duration::ZERO))
}
