//! Incremental decoding of the coach event stream.
//!
//! [`DecodeSession`] is the synchronous state machine: bytes in, events out.
//! [`decode`] drives a session from an async byte stream and routes events to
//! a [`CoachSink`], honoring cancellation and an optional idle timeout.

use std::time::Duration;

use bytes::Bytes;
use dealpack_types::{CoachError, CoachSink};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::frame::{CoachEvent, FrameError, parse_frame};

/// Counters for one decode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Raw bytes received.
    pub bytes: u64,
    /// Lines that decoded into an event.
    pub frames: u64,
    /// Token deltas among `frames`.
    pub tokens: u64,
    /// Non-blank lines discarded: no prefix, bad JSON or unknown shape. An
    /// unterminated line left at end of input counts here too.
    pub dropped_frames: u64,
    /// Blank separator lines.
    pub blank_lines: u64,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `on_complete(None)` was invoked, by a `done` frame or stream exhaustion.
    Completed,
    /// `on_complete(Some(_))` was invoked.
    CompletedWithFallback,
    /// `on_error` was invoked.
    Failed,
    /// The session was cancelled; no terminal callback was invoked.
    Cancelled,
}

/// Result of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub outcome: SessionOutcome,
    pub stats: DecodeStats,
}

/// Per-session decoder state.
///
/// Holds the text not yet terminated by a newline and any trailing bytes of
/// a UTF-8 sequence split across chunks. Once a terminal event has been
/// produced the session ignores all further input.
#[derive(Debug, Default)]
pub struct DecodeSession {
    line_buf: String,
    utf8_carry: Vec<u8>,
    finished: bool,
    stats: DecodeStats,
}

impl DecodeSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Whether a terminal event has already been produced.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one transport chunk and return the events it completes.
    ///
    /// The returned events stop at the first terminal one.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<CoachEvent> {
        if self.finished {
            return Vec::new();
        }
        self.stats.bytes += chunk.len() as u64;
        self.append_utf8(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline_pos).collect();
            if let Some(event) = self.process_line(&line[..newline_pos]) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.finish_now();
                    break;
                }
            }
        }
        events
    }

    /// Signal end of input.
    ///
    /// Only newline-terminated lines are frames, so a trailing partial line
    /// is discarded and counted in `dropped_frames`. The returned events are
    /// a single implicit completion unless the session had already finished.
    pub fn finish(&mut self) -> Vec<CoachEvent> {
        if self.finished {
            return Vec::new();
        }
        if !self.utf8_carry.is_empty() {
            let tail = std::mem::take(&mut self.utf8_carry);
            self.line_buf.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.line_buf);
        if !rest.trim().is_empty() {
            self.stats.dropped_frames += 1;
            tracing::debug!(line = %rest, "discarding unterminated trailing line");
        }
        self.finish_now();
        vec![CoachEvent::Completion { fallback: None }]
    }

    fn finish_now(&mut self) {
        self.finished = true;
        self.line_buf.clear();
        self.utf8_carry.clear();
    }

    /// Decode bytes into the line buffer. Incomplete trailing sequences wait
    /// for the next chunk; invalid sequences become U+FFFD.
    fn append_utf8(&mut self, chunk: &[u8]) {
        let joined;
        let mut bytes: &[u8] = if self.utf8_carry.is_empty() {
            chunk
        } else {
            self.utf8_carry.extend_from_slice(chunk);
            joined = std::mem::take(&mut self.utf8_carry);
            &joined
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(s) => {
                    self.line_buf.push_str(s);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buf
                        .push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            bytes = &bytes[valid + len..];
                        }
                        None => {
                            self.utf8_carry = bytes[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Option<CoachEvent> {
        if line.trim().is_empty() {
            self.stats.blank_lines += 1;
            return None;
        }
        match parse_frame(line) {
            Ok(event) => {
                self.stats.frames += 1;
                if matches!(event, CoachEvent::TokenDelta(_)) {
                    self.stats.tokens += 1;
                }
                Some(event)
            }
            Err(FrameError::MissingPrefix) => {
                self.stats.dropped_frames += 1;
                tracing::trace!(line, "ignoring non-data line");
                None
            }
            Err(err) => {
                self.stats.dropped_frames += 1;
                tracing::warn!(error = %err, line, "dropping malformed coach frame");
                None
            }
        }
    }
}

/// Run one decode session over `stream`, reporting to `sink`.
///
/// Tokens are delivered in arrival order. Exactly one terminal callback
/// follows unless `cancel` fires first, in which case no further callback is
/// invoked at all. A read error or an idle gap longer than `idle_timeout`
/// is reported through `on_error`. The stream is dropped before returning.
pub async fn decode<St, E, S>(
    stream: St,
    sink: &mut S,
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
) -> DecodeSummary
where
    St: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
    S: CoachSink + ?Sized,
{
    let mut session = DecodeSession::new();
    let mut stream = std::pin::pin!(stream);

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break SessionOutcome::Cancelled,
            next = next_chunk(&mut stream, idle_timeout) => next,
        };

        match next {
            Ok(Some(Ok(chunk))) => {
                let events = session.push_chunk(&chunk);
                if let Some(outcome) = dispatch(events, sink, cancel) {
                    break outcome;
                }
            }
            Ok(Some(Err(e))) => {
                sink.on_error(CoachError::Network(e.into()));
                break SessionOutcome::Failed;
            }
            Ok(None) => {
                let events = session.finish();
                break dispatch(events, sink, cancel).unwrap_or(SessionOutcome::Completed);
            }
            Err(idle) => {
                sink.on_error(CoachError::Timeout(idle));
                break SessionOutcome::Failed;
            }
        }
    };

    let stats = session.stats();
    tracing::debug!(
        ?outcome,
        bytes = stats.bytes,
        frames = stats.frames,
        tokens = stats.tokens,
        dropped_frames = stats.dropped_frames,
        "coach stream session finished"
    );
    DecodeSummary { outcome, stats }
}

/// Await the next chunk, bounded by the idle timeout if one is set.
async fn next_chunk<St>(
    stream: &mut St,
    idle_timeout: Option<Duration>,
) -> Result<Option<St::Item>, Duration>
where
    St: Stream + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| limit),
        None => Ok(stream.next().await),
    }
}

/// Deliver events to the sink. Returns the outcome once a terminal event has
/// been delivered or cancellation is observed.
fn dispatch<S>(
    events: Vec<CoachEvent>,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Option<SessionOutcome>
where
    S: CoachSink + ?Sized,
{
    for event in events {
        if cancel.is_cancelled() {
            return Some(SessionOutcome::Cancelled);
        }
        match event {
            CoachEvent::TokenDelta(text) => sink.on_token(&text),
            CoachEvent::Completion { fallback: None } => {
                sink.on_complete(None);
                return Some(SessionOutcome::Completed);
            }
            CoachEvent::Completion { fallback } => {
                sink.on_complete(fallback);
                return Some(SessionOutcome::CompletedWithFallback);
            }
            CoachEvent::Error(message) => {
                sink.on_error(CoachError::Stream(message));
                return Some(SessionOutcome::Failed);
            }
        }
    }
    None
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dealpack_types::StreamEvent;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + use<> {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn run(parts: &[&str]) -> (Vec<StreamEvent>, DecodeSummary) {
        let mut events = Vec::new();
        let summary = decode(chunks(parts), &mut events, &CancellationToken::new(), None).await;
        (events, summary)
    }

    fn tokens(events: &[StreamEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn split_payload_then_done() {
        let (events, summary) = run(&[
            "data: {\"delta\":\"Hel",
            "lo\"}\n\ndata: {\"done\":true}\n",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Token(t) if t == "Hello"));
        assert!(matches!(&events[1], StreamEvent::Complete { fallback: None }));
        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!(summary.stats.tokens, 1);
        assert_eq!(summary.stats.blank_lines, 1);
    }

    #[tokio::test]
    async fn error_frame_is_terminal() {
        let (events, summary) = run(&["data: {\"error\":\"quota exceeded\"}\n"]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Failed(CoachError::Stream(m)) if m == "quota exceeded"
        ));
        assert_eq!(summary.outcome, SessionOutcome::Failed);
    }

    #[tokio::test]
    async fn malformed_lines_are_dropped() {
        let (events, summary) = run(&[
            ": keep-alive\n",
            "data: {\"delta\":\"a\"}\n",
            "data: {broken\n",
            "event: ping\n",
            "data: {\"unknown\":1}\n",
            "data: {\"delta\":\"b\"}\n",
        ])
        .await;
        assert_eq!(tokens(&events), vec!["a", "b"]);
        assert!(matches!(events.last(), Some(StreamEvent::Complete { fallback: None })));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Failed(_))));
        assert_eq!(summary.stats.dropped_frames, 4);
    }

    #[tokio::test]
    async fn nothing_after_done() {
        let (events, summary) = run(&[
            "data: {\"done\":true}\ndata: {\"delta\":\"late\"}\n",
            "data: {\"error\":\"late\"}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Complete { fallback: None }));
        assert_eq!(summary.outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn exhaustion_completes_once() {
        let (events, summary) = run(&["data: {\"delta\":\"a\"}\n", "data: {\"delta\":\"b\"}\n"]).await;
        assert_eq!(tokens(&events), vec!["a", "b"]);
        let completions = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Complete { fallback: None }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(events.len(), 3);
        assert_eq!(summary.outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn empty_stream_completes() {
        let (events, summary) = run(&[]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Complete { fallback: None }));
        assert_eq!(summary.outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn fallback_is_verbatim_and_terminal() {
        let (events, summary) = run(&[
            "data: {\"fallback\":\"Full report text\"}\n",
            "data: {\"delta\":\"ignored\"}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Complete { fallback: Some(f) } if f == "Full report text"
        ));
        assert_eq!(summary.outcome, SessionOutcome::CompletedWithFallback);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_dropped() {
        let (events, summary) = run(&["data: {\"delta\":\"a\"}\ndata: {\"delta\":\"partial\"}"]).await;
        assert_eq!(tokens(&events), vec!["a"]);
        assert!(matches!(events.last(), Some(StreamEvent::Complete { fallback: None })));
        assert_eq!(summary.stats.dropped_frames, 1);
    }

    #[tokio::test]
    async fn unterminated_error_frame_still_completes() {
        let (events, summary) = run(&[
            "data: {\"delta\":\"a\"}\n",
            "data: {\"error\":\"late\"}",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Token(t) if t == "a"));
        assert!(matches!(&events[1], StreamEvent::Complete { fallback: None }));
        assert_eq!(summary.outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"delta\":\"a\"}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: {\"delta\":\"b\"}\n")),
        ];
        let mut events = Vec::new();
        let summary = decode(
            futures::stream::iter(parts),
            &mut events,
            &CancellationToken::new(),
            None,
        )
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Token(t) if t == "a"));
        assert!(matches!(&events[1], StreamEvent::Failed(CoachError::Network(_))));
        assert_eq!(summary.outcome, SessionOutcome::Failed);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        let frame = "data: {\"delta\":\"caf\u{e9} \u{1f3e0}\"}\n".as_bytes();
        // Split inside both the two-byte and the four-byte sequence.
        let e_acute = frame.iter().position(|&b| b == 0xC3).unwrap();
        let house = frame.iter().position(|&b| b == 0xF0).unwrap();
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::copy_from_slice(&frame[..e_acute + 1])),
            Ok(Bytes::copy_from_slice(&frame[e_acute + 1..house + 2])),
            Ok(Bytes::copy_from_slice(&frame[house + 2..])),
        ];
        let mut events = Vec::new();
        decode(
            futures::stream::iter(parts),
            &mut events,
            &CancellationToken::new(),
            None,
        )
        .await;
        assert_eq!(tokens(&events), vec!["caf\u{e9} \u{1f3e0}"]);
    }

    #[tokio::test]
    async fn cancelled_before_start_invokes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut events = Vec::new();
        let summary = decode(
            chunks(&["data: {\"delta\":\"a\"}\n"]),
            &mut events,
            &cancel,
            None,
        )
        .await;
        assert!(events.is_empty());
        assert_eq!(summary.outcome, SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancel_stops_a_stalled_stream() {
        let stalled = chunks(&["data: {\"delta\":\"a\"}\n"]).chain(futures::stream::pending());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut events = Vec::new();
        let summary = decode(stalled, &mut events, &cancel, None).await;
        assert_eq!(tokens(&events), vec!["a"]);
        assert_eq!(events.len(), 1);
        assert_eq!(summary.outcome, SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn idle_timeout_reports_error() {
        let stalled = chunks(&["data: {\"delta\":\"a\"}\n"]).chain(futures::stream::pending());
        let mut events = Vec::new();
        let summary = decode(
            stalled,
            &mut events,
            &CancellationToken::new(),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            StreamEvent::Failed(CoachError::Timeout(d)) if *d == Duration::from_millis(20)
        ));
        assert_eq!(summary.outcome, SessionOutcome::Failed);
    }

    #[test]
    fn session_ignores_input_after_terminal() {
        let mut session = DecodeSession::new();
        let events = session.push_chunk(b"data: {\"done\":true}\ndata: {\"delta\":\"x\"}\n");
        assert_eq!(events, vec![CoachEvent::Completion { fallback: None }]);
        assert!(session.is_finished());
        assert!(session.push_chunk(b"data: {\"delta\":\"y\"}\n").is_empty());
        assert!(session.finish().is_empty());
        assert_eq!(session.stats().tokens, 0);
    }

    #[test]
    fn session_retains_partial_line() {
        let mut session = DecodeSession::new();
        assert!(session.push_chunk(b"data: {\"del").is_empty());
        assert!(session.push_chunk(b"ta\":\"x\"}").is_empty());
        assert_eq!(
            session.push_chunk(b"\n"),
            vec![CoachEvent::TokenDelta("x".into())]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut session = DecodeSession::new();
        let events = session.push_chunk(b"data: {\"delta\":\"a\xFFb\"}\n");
        assert_eq!(events, vec![CoachEvent::TokenDelta("a\u{FFFD}b".into())]);
    }

    #[test]
    fn finish_discards_partial_line_and_dangling_bytes() {
        let mut session = DecodeSession::new();
        assert!(session.push_chunk(b"data: {\"delta\":\"a\"}\xC3").is_empty());
        // No newline arrived, so the partial line and its dangling lead byte
        // are discarded.
        let events = session.finish();
        assert_eq!(events, vec![CoachEvent::Completion { fallback: None }]);
        assert_eq!(session.stats().dropped_frames, 1);
    }
}
