//! Configuration for [`CoachClient`](crate::CoachClient).

use std::time::Duration;

/// Environment variable holding the backend base URL.
pub const ENV_BACKEND_URL: &str = "DEALPACK_BACKEND_URL";
/// Environment variable overriding the idle timeout, in seconds. `0` disables it.
pub const ENV_IDLE_TIMEOUT_SECS: &str = "DEALPACK_COACH_IDLE_TIMEOUT_SECS";
/// Environment variable overriding the request timeout, in seconds. `0` disables it.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "DEALPACK_COACH_REQUEST_TIMEOUT_SECS";
/// Environment variable toggling newest-session-wins (`true`/`false`).
pub const ENV_EXCLUSIVE_SESSIONS: &str = "DEALPACK_COACH_EXCLUSIVE_SESSIONS";

/// Static configuration for a coach client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachConfig {
    /// Backend origin, without the `/api` path.
    pub base_url: String,

    /// Longest allowed gap between stream chunks.
    pub idle_timeout: Option<Duration>,

    /// Upper bound on non-streaming requests and on receiving stream headers.
    pub request_timeout: Option<Duration>,

    /// Starting a stream cancels the previous one from the same client.
    pub exclusive_sessions: bool,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".into(),
            idle_timeout: Some(Duration::from_secs(60)),
            request_timeout: Some(Duration::from_secs(30)),
            exclusive_sessions: true,
        }
    }
}

impl CoachConfig {
    /// Defaults overridden by any of the `DEALPACK_*` environment variables
    /// that are set and parse.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(timeout) = lookup(ENV_IDLE_TIMEOUT_SECS).and_then(|v| parse_secs(&v)) {
            config.idle_timeout = timeout;
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT_SECS).and_then(|v| parse_secs(&v)) {
            config.request_timeout = timeout;
        }
        if let Some(exclusive) = lookup(ENV_EXCLUSIVE_SESSIONS).and_then(|v| v.trim().parse().ok()) {
            config.exclusive_sessions = exclusive;
        }

        config
    }
}

/// `"0"` disables the timeout; unparseable values are ignored.
fn parse_secs(value: &str) -> Option<Option<Duration>> {
    match value.trim().parse::<u64>() {
        Ok(0) => Some(None),
        Ok(secs) => Some(Some(Duration::from_secs(secs))),
        Err(_) => {
            tracing::warn!(value, "ignoring non-numeric timeout setting");
            None
        }
    }
}
