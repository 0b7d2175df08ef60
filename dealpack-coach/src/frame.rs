//! Frame-level codec for the coach event stream.
//!
//! The backend writes one event per line:
//!
//! ```text
//! data: {"delta":"Call 20 "}
//!
//! data: {"delta":"past clients"}
//!
//! data: {"done":true}
//! ```
//!
//! Recognized payload shapes are `{"delta": text}`, `{"done": true}`,
//! `{"fallback": payload}` and `{"error": message}`. When several keys are
//! present the first match in that order wins.

use serde_json::Value;

/// Prefix every event line carries.
pub const FRAME_PREFIX: &str = "data: ";

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachEvent {
    /// A fragment of generated content.
    TokenDelta(String),
    /// End of stream. `fallback` carries the full payload when the server
    /// degraded from token streaming.
    Completion {
        /// Fallback payload, verbatim when the server sent a string and as
        /// compact JSON otherwise.
        fallback: Option<String>,
    },
    /// The server reported a failure.
    Error(String),
}

impl CoachEvent {
    /// Whether this event ends the session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::TokenDelta(_))
    }
}

/// Why a line was not turned into an event. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("line lacks the `data: ` prefix")]
    MissingPrefix,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("payload has no recognized key")]
    UnrecognizedShape,
}

/// Parse one line of the stream into an event.
///
/// A trailing `\r` is ignored so CRLF-terminated streams decode the same as
/// LF-terminated ones.
pub fn parse_frame(line: &str) -> Result<CoachEvent, FrameError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line
        .strip_prefix(FRAME_PREFIX)
        .ok_or(FrameError::MissingPrefix)?;
    let json: Value =
        serde_json::from_str(payload).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    classify(&json)
}

/// Map a parsed payload to an event using the fixed key priority
/// `delta`, `done`, `fallback`, `error`.
fn classify(json: &Value) -> Result<CoachEvent, FrameError> {
    let Value::Object(map) = json else {
        return Err(FrameError::UnrecognizedShape);
    };

    if let Some(Value::String(text)) = map.get("delta") {
        return Ok(CoachEvent::TokenDelta(text.clone()));
    }
    if let Some(Value::Bool(true)) = map.get("done") {
        return Ok(CoachEvent::Completion { fallback: None });
    }
    if let Some(payload) = map.get("fallback").filter(|v| !v.is_null()) {
        return Ok(CoachEvent::Completion {
            fallback: Some(value_text(payload)),
        });
    }
    if let Some(message) = map.get("error").filter(|v| !v.is_null()) {
        return Ok(CoachEvent::Error(value_text(message)));
    }

    Err(FrameError::UnrecognizedShape)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
