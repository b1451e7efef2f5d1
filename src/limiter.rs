//! Rate Limiting
//!
//! Throttle and debounce wrappers for high-frequency handlers. Both read
//! Tokio's clock, so paused-time tests drive them deterministically.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Runs the first call of each window and drops the rest.
///
/// Dropped calls are not queued and there is no trailing call. The next
/// window opens once `window` has passed since the call that opened the
/// current one.
pub struct Throttle<F> {
    window: Duration,
    opened_at: Mutex<Option<Instant>>,
    f: F,
}

impl<F> Throttle<F> {
    pub fn new(window: Duration, f: F) -> Self {
        Self {
            window,
            opened_at: Mutex::new(None),
            f,
        }
    }

    /// Invoke the wrapped function unless a window is open.
    ///
    /// Returns whether the function ran.
    pub fn call<A>(&self, args: A) -> bool
    where
        F: Fn(A),
    {
        {
            let mut opened_at = self.opened_at.lock();
            let now = Instant::now();
            if let Some(start) = *opened_at {
                if now.duration_since(start) < self.window {
                    return false;
                }
            }
            *opened_at = Some(now);
        }
        (self.f)(args);
        true
    }
}

/// Collapses a burst of calls into one trailing call.
///
/// Each call cancels the pending one and schedules the function `window`
/// later with this call's arguments. Scheduling spawns onto the current
/// Tokio runtime.
pub struct Debounce<A> {
    window: Duration,
    f: Arc<dyn Fn(A) + Send + Sync>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Send + 'static> Debounce<A> {
    pub fn new(window: Duration, f: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            window,
            f: Arc::new(f),
            pending: Mutex::new(None),
        }
    }

    /// Restart the timer with `args` as the arguments of the eventual call
    pub fn call(&self, args: A) {
        let f = self.f.clone();
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            f(args);
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Drop the scheduled call, if any
    pub fn cancel(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }

    /// Whether a call is scheduled and has not run yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}
