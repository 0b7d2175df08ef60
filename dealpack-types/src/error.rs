//! Error types shared by the coach client and its callers.

use std::time::Duration;

/// Message shown for a failed request whose response body was empty.
pub const GENERIC_FAILURE_MESSAGE: &str = "AI Coach request failed";

/// Errors surfaced by coach requests and decode sessions.
///
/// Malformed frames never become a `CoachError`; the decoder drops them and
/// keeps going. Everything here is terminal for the request or session that
/// produced it.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    // Request-level rejections
    /// The account's plan does not include the coach (HTTP 403).
    #[error("upgrade to Pro required for AI Coach: {0}")]
    UpgradeRequired(String),
    /// Rate limited by the backend (HTTP 429).
    #[error("{}", rate_limit_message(.retry_after))]
    RateLimited {
        /// Server-supplied delay before the caller may retry.
        retry_after: Option<Duration>,
    },
    /// Any other non-success status.
    #[error("{}", request_failed_message(*.status, .body))]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body text, possibly empty.
        body: String,
    },

    // Transport
    /// Network-level failure while sending or reading.
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// No bytes arrived within the idle timeout.
    #[error("stream idle for {0:?}")]
    Timeout(Duration),

    // Payload
    /// The server sent an explicit error frame mid-stream.
    #[error("stream error: {0}")]
    Stream(String),
    /// A response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The backend answered successfully but reported an error in the body.
    #[error("backend error: {0}")]
    Backend(String),
}

impl CoachError {
    /// Whether re-issuing the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    /// Whether the caller should show an upgrade prompt.
    #[must_use]
    pub fn is_upgrade_required(&self) -> bool {
        matches!(self, Self::UpgradeRequired(_))
    }

    /// The server-supplied retry delay, if this is a rate-limit rejection.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn rate_limit_message(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(
            "rate limit exceeded, try again in {} seconds",
            d.as_secs()
        ),
        None => "rate limit exceeded".to_string(),
    }
}

fn request_failed_message(status: u16, body: &str) -> String {
    if body.trim().is_empty() {
        format!("{GENERIC_FAILURE_MESSAGE} (HTTP {status})")
    } else {
        format!("HTTP {status}: {body}")
    }
}
