//! Cancellation-aware timed waits
//!
//! Every bounded wait in the launch engine and the controller workers goes
//! through these helpers: block up to the interval, wake early when the
//! token fires. Cancellation latency is bounded by the poll interval, never
//! by the full phase timeout.

use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of a bounded cancellable poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// One cancellation signal per agent.
///
/// `arm` wakes every wait holding the current token; `reset` swaps in a
/// fresh token at the start of a new launch so a stale cancellation never
/// affects a later one.
#[derive(Debug)]
pub struct CancelSignal {
    current: Mutex<CancellationToken>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// Arm the signal, releasing any wait blocked on the current token
    pub fn arm(&self) {
        self.current.lock().cancel();
    }

    /// Swap in a fresh token and hand it out for the waits of a new launch
    pub fn reset(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        *self.current.lock() = fresh.clone();
        fresh
    }

    pub fn is_armed(&self) -> bool {
        self.current.lock().is_cancelled()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `duration` unless the token fires first.
/// Returns true if the wait was cancelled.
pub async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = cancel.cancelled() => true,
    }
}

/// Poll `check` at a fixed `interval` until it reports ready, `timeout`
/// elapses, or the token fires. The check runs once before the first wait,
/// so an already-satisfied condition returns without sleeping.
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if check().await {
            return WaitOutcome::Ready;
        }
        if start.elapsed() >= timeout {
            return WaitOutcome::TimedOut;
        }
        if sleep_unless_cancelled(interval, cancel).await {
            return WaitOutcome::Cancelled;
        }
    }
}
