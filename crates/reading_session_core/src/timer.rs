//! crates/reading_session_core/src/timer.rs
//!
//! The debounce timer used to delay progress saves.
//!
//! A timer never calls back into the session. When it expires it reports its
//! ticket to whoever owns the session, and the session decides whether that
//! ticket still matches its pending save. This keeps every state change on the
//! session's own task and lets tests fire timers by hand.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An armed timer. Cancelling it guarantees its ticket is never reported.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait DebounceTimer: Send + Sync {
    /// Arms a timer that reports `ticket` once `delay` has elapsed.
    fn arm(&self, delay: Duration, ticket: u64) -> TimerHandle;
}

//=========================================================================================
// Tokio Timer
//=========================================================================================

/// Sleeps on the tokio clock and reports expired tickets through a channel.
pub struct TokioDebounceTimer {
    fired: mpsc::UnboundedSender<u64>,
}

impl TokioDebounceTimer {
    /// Returns the timer and the receiving end its expired tickets arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (fired, expired) = mpsc::unbounded_channel();
        (Self { fired }, expired)
    }
}

impl DebounceTimer for TokioDebounceTimer {
    fn arm(&self, delay: Duration, ticket: u64) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let fired = self.fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // The token may have been cancelled while the sleep was completing.
                    if !cancelled.is_cancelled() && fired.send(ticket).is_err() {
                        debug!(ticket, "Debounce timer expired after its session ended.");
                    }
                }
            }
        });
        TimerHandle::new(token)
    }
}

//=========================================================================================
// Manual Timer
//=========================================================================================

/// A timer that only records what was armed. Tests decide when tickets expire.
#[derive(Default)]
pub struct ManualDebounceTimer {
    armed: Mutex<Vec<(Duration, u64, CancellationToken)>>,
}

impl ManualDebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(delay, ticket)` ever armed, in order.
    pub fn armed(&self) -> Vec<(Duration, u64)> {
        self.entries()
            .iter()
            .map(|(delay, ticket, _)| (*delay, *ticket))
            .collect()
    }

    /// Tickets whose timers have not been cancelled.
    pub fn live_tickets(&self) -> Vec<u64> {
        self.entries()
            .iter()
            .filter(|(_, _, token)| !token.is_cancelled())
            .map(|(_, ticket, _)| *ticket)
            .collect()
    }

    fn entries(&self) -> Vec<(Duration, u64, CancellationToken)> {
        match self.armed.lock() {
            Ok(armed) => armed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DebounceTimer for ManualDebounceTimer {
    fn arm(&self, delay: Duration, ticket: u64) -> TimerHandle {
        let token = CancellationToken::new();
        let mut armed = match self.armed.lock() {
            Ok(armed) => armed,
            Err(poisoned) => poisoned.into_inner(),
        };
        armed.push((delay, ticket, token.clone()));
        TimerHandle::new(token)
    }
}
