//! Newest-session-wins coordination for streams that share one sink.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// Tracks the cancellation token of the most recently begun session.
///
/// Beginning a session cancels the previous one, so a retry never races an
/// older stream into the same display.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current session, if any, and register a new one.
    ///
    /// The returned token is a child of `parent`: cancelling the caller's
    /// token still stops the session, and superseding it does not touch the
    /// caller's token.
    pub fn begin(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let previous = self.lock().replace(token.clone());
        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                tracing::debug!("superseding in-flight coach session");
            }
            previous.cancel();
        }
        token
    }

    /// Cancel the current session without starting another.
    pub fn cancel_current(&self) {
        if let Some(current) = self.lock().take() {
            current.cancel();
        }
    }

    /// Whether a registered session is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A poisoned slot still holds a valid token.
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
