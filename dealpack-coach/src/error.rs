//! Internal error helpers for mapping HTTP/reqwest errors to [`CoachError`].

use std::time::Duration;

use dealpack_types::CoachError;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Map a non-success response from the coach backend to a [`CoachError`].
///
/// 403 means the plan lacks the coach, 429 carries a retry delay, and every
/// other status keeps the body text for display.
pub(crate) fn map_http_status(
    status: reqwest::StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> CoachError {
    match status.as_u16() {
        403 => CoachError::UpgradeRequired(body.to_string()),
        429 => CoachError::RateLimited {
            retry_after: retry_after_header(headers).or_else(|| retry_after_body(body)),
        },
        code => CoachError::RequestFailed {
            status: code,
            body: body.to_string(),
        },
    }
}

/// Parse the `Retry-After` header as a number of seconds.
///
/// The HTTP-date form is not used by the coach backend and is ignored.
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// The backend's 429 body is `{"detail": "...", "retry_after": 42}`.
fn retry_after_body(body: &str) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")?.as_u64().map(Duration::from_secs)
}

/// Map a [`reqwest::Error`] to a [`CoachError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Option<Duration>) -> CoachError {
    match timeout {
        Some(limit) if err.is_timeout() => CoachError::Timeout(limit),
        _ => CoachError::Network(Box::new(err)),
    }
}
