//! Coach API client struct and builder.

use std::sync::Arc;
use std::time::Duration;

use dealpack_types::{CoachDiagnostics, CoachError, CoachReport, CoachRequest, CoachSink};
use tokio_util::sync::CancellationToken;

use crate::config::CoachConfig;
use crate::error::{map_http_status, map_reqwest_error};
use crate::session::SessionSlot;
use crate::streaming::{DecodeStats, DecodeSummary, SessionOutcome, decode};

/// Path of the generate endpoint, relative to the base URL.
const GENERATE_PATH: &str = "/api/ai-coach-v2/generate";

/// Path of the diagnostics endpoint, relative to the base URL.
const DIAG_PATH: &str = "/api/ai-coach-v2/diag";

/// Client for the AI coach endpoints.
///
/// Clones share the HTTP connection pool and the [`SessionSlot`], so a
/// stream started from any clone supersedes one started from another when
/// exclusive sessions are enabled.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use dealpack_coach::CoachClient;
///
/// let client = CoachClient::new("https://app.dealpack.example")
///     .idle_timeout(Some(Duration::from_secs(30)))
///     .exclusive_sessions(true);
/// ```
#[derive(Debug, Clone)]
pub struct CoachClient {
    /// Backend origin (override for testing or proxies).
    pub(crate) base_url: String,
    /// Longest allowed gap between stream chunks.
    pub(crate) idle_timeout: Option<Duration>,
    /// Bound on non-streaming requests and on stream response headers.
    pub(crate) request_timeout: Option<Duration>,
    /// Whether a new stream cancels the previous one.
    pub(crate) exclusive_sessions: bool,
    /// Shared HTTP client.
    pub(crate) client: reqwest::Client,
    /// The most recent stream session.
    pub(crate) sessions: Arc<SessionSlot>,
}

impl CoachClient {
    /// Create a client for `base_url` with the remaining settings defaulted.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(CoachConfig {
            base_url: base_url.into(),
            ..CoachConfig::default()
        })
    }

    /// Create a client from a full configuration.
    #[must_use]
    pub fn from_config(config: CoachConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            idle_timeout: config.idle_timeout,
            request_timeout: config.request_timeout,
            exclusive_sessions: config.exclusive_sessions,
            client: reqwest::Client::new(),
            sessions: Arc::new(SessionSlot::new()),
        }
    }

    /// Create a client configured from `DEALPACK_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(CoachConfig::from_env())
    }

    /// Override the idle timeout between stream chunks. `None` waits forever.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the request timeout. `None` waits forever.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable newest-session-wins.
    #[must_use]
    pub fn exclusive_sessions(mut self, exclusive: bool) -> Self {
        self.exclusive_sessions = exclusive;
        self
    }

    /// Use a preconfigured HTTP client, e.g. one with a cookie store.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// The slot tracking this client's current stream session.
    #[must_use]
    pub fn sessions(&self) -> &SessionSlot {
        &self.sessions
    }

    pub(crate) fn generate_url(&self) -> String {
        format!("{}{GENERATE_PATH}", self.base_url)
    }

    pub(crate) fn diag_url(&self) -> String {
        format!("{}{DIAG_PATH}", self.base_url)
    }

    /// Request a complete coaching report in one round trip.
    ///
    /// `force` bypasses the backend cache; `year` selects the P&L year.
    pub async fn fetch_once(
        &self,
        force: bool,
        year: Option<i32>,
    ) -> Result<CoachReport, CoachError> {
        let url = self.generate_url();
        let body = CoachRequest::once(force, year);

        tracing::debug!(url = %url, force, year = ?year, "sending coach request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(limit) = self.request_timeout {
            request = request.timeout(limit);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.request_timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, self.request_timeout))?;

        if !status.is_success() {
            return Err(map_http_status(status, &headers, &response_text));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| CoachError::InvalidResponse(format!("coach report: {e}")))
    }

    /// Fetch a summary of the data the coach can see for the current user.
    pub async fn diagnostics(&self) -> Result<CoachDiagnostics, CoachError> {
        let url = self.diag_url();

        tracing::debug!(url = %url, "fetching coach diagnostics");

        let mut request = self.client.get(&url);
        if let Some(limit) = self.request_timeout {
            request = request.timeout(limit);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.request_timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, self.request_timeout))?;

        if !status.is_success() {
            return Err(map_http_status(status, &headers, &response_text));
        }

        let json: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| CoachError::InvalidResponse(format!("diagnostics: {e}")))?;
        if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
            return Err(CoachError::Backend(message.to_string()));
        }
        serde_json::from_value(json)
            .map_err(|e| CoachError::InvalidResponse(format!("diagnostics: {e}")))
    }

    /// Stream a coaching response into `sink`.
    ///
    /// `request.stream` is forced on. Request failures (send errors, non-2xx
    /// statuses) are reported through `sink.on_error` like any other session
    /// failure, so the sink always sees exactly one terminal callback unless
    /// the session is cancelled, by `cancel` or by a newer session on this
    /// client when exclusive sessions are enabled.
    pub async fn generate_stream<S>(
        &self,
        request: CoachRequest,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> DecodeSummary
    where
        S: CoachSink + ?Sized,
    {
        let session = if self.exclusive_sessions {
            self.sessions.begin(cancel)
        } else {
            cancel.child_token()
        };
        // Ending the session, however it ends, cancels its token so the slot
        // no longer reports it as active.
        let _session_guard = session.clone().drop_guard();
        let url = self.generate_url();
        let body = CoachRequest {
            stream: true,
            ..request
        };

        tracing::debug!(url = %url, force = body.force, year = ?body.year, "sending streaming coach request");

        let send = self.client.post(&url).json(&body).send();
        let sent = tokio::select! {
            biased;
            () = session.cancelled() => return failed_before_stream(SessionOutcome::Cancelled),
            sent = with_timeout(send, self.request_timeout) => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                sink.on_error(err);
                return failed_before_stream(SessionOutcome::Failed);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body_text = tokio::select! {
                biased;
                () = session.cancelled() => return failed_before_stream(SessionOutcome::Cancelled),
                text = response.text() => error_body(text),
            };
            sink.on_error(map_http_status(status, &headers, &body_text));
            return failed_before_stream(SessionOutcome::Failed);
        }

        decode(response.bytes_stream(), sink, &session, self.idle_timeout).await
    }
}

/// Await a request send, mapping transport errors and the optional deadline.
async fn with_timeout<F>(send: F, limit: Option<Duration>) -> Result<reqwest::Response, CoachError>
where
    F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, send).await {
            Ok(result) => result.map_err(|e| map_reqwest_error(e, Some(limit))),
            Err(_) => Err(CoachError::Timeout(limit)),
        },
        None => send.await.map_err(|e| map_reqwest_error(e, None)),
    }
}

/// Body text of a failed response; a body that cannot be read is reported
/// as empty.
fn error_body(text: Result<String, reqwest::Error>) -> String {
    text.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "failed to read coach error response body");
        String::new()
    })
}

fn failed_before_stream(outcome: SessionOutcome) -> DecodeSummary {
    DecodeSummary {
        outcome,
        stats: DecodeStats::default(),
    }
}
