//! Callback surface for streaming coach sessions.

use crate::error::CoachError;

/// Receiver of decoded session output.
///
/// A session invokes [`on_token`](CoachSink::on_token) zero or more times in
/// arrival order, then at most one of [`on_complete`](CoachSink::on_complete)
/// or [`on_error`](CoachSink::on_error). Nothing is invoked after the terminal
/// callback, and nothing at all once the session has been cancelled.
pub trait CoachSink {
    /// A fragment of generated text.
    fn on_token(&mut self, text: &str);

    /// The session finished. `fallback` carries the full response when the
    /// server degraded from token streaming to a single payload.
    fn on_complete(&mut self, fallback: Option<String>);

    /// The session failed.
    fn on_error(&mut self, error: CoachError);
}

/// One observed sink callback, for callers that prefer collecting to reacting.
#[derive(Debug)]
pub enum StreamEvent {
    /// `on_token` was invoked.
    Token(String),
    /// `on_complete` was invoked.
    Complete {
        /// Fallback payload, if any.
        fallback: Option<String>,
    },
    /// `on_error` was invoked.
    Failed(CoachError),
}

impl StreamEvent {
    /// Whether this event ends a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

impl CoachSink for Vec<StreamEvent> {
    fn on_token(&mut self, text: &str) {
        self.push(StreamEvent::Token(text.to_string()));
    }

    fn on_complete(&mut self, fallback: Option<String>) {
        self.push(StreamEvent::Complete { fallback });
    }

    fn on_error(&mut self, error: CoachError) {
        self.push(StreamEvent::Failed(error));
    }
}

/// A [`CoachSink`] assembled from three closures.
///
/// ```
/// use dealpack_types::{CoachError, CoachSink, FnSink};
///
/// let mut text = String::new();
/// let mut done = false;
/// {
///     let mut sink = FnSink::new(
///         |t: &str| text.push_str(t),
///         |_fallback: Option<String>| done = true,
///         |_err: CoachError| {},
///     );
///     sink.on_token("Hel");
///     sink.on_token("lo");
///     sink.on_complete(None);
/// }
/// assert_eq!(text, "Hello");
/// assert!(done);
/// ```
pub struct FnSink<T, C, E> {
    on_token: T,
    on_complete: C,
    on_error: E,
}

impl<T, C, E> FnSink<T, C, E>
where
    T: FnMut(&str),
    C: FnMut(Option<String>),
    E: FnMut(CoachError),
{
    /// Build a sink from token, completion and error callbacks.
    pub fn new(on_token: T, on_complete: C, on_error: E) -> Self {
        Self {
            on_token,
            on_complete,
            on_error,
        }
    }
}

impl<T, C, E> CoachSink for FnSink<T, C, E>
where
    T: FnMut(&str),
    C: FnMut(Option<String>),
    E: FnMut(CoachError),
{
    fn on_token(&mut self, text: &str) {
        (self.on_token)(text);
    }

    fn on_complete(&mut self, fallback: Option<String>) {
        (self.on_complete)(fallback);
    }

    fn on_error(&mut self, error: CoachError) {
        (self.on_error)(error);
    }
}

impl<S: CoachSink + ?Sized> CoachSink for &mut S {
    fn on_token(&mut self, text: &str) {
        (**self).on_token(text);
    }

    fn on_complete(&mut self, fallback: Option<String>) {
        (**self).on_complete(fallback);
    }

    fn on_error(&mut self, error: CoachError) {
        (**self).on_error(error);
    }
}
