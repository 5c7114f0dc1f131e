//! Cancellation token and the clock the polling loop runs on.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cloneable flag observed at the top of each round and during backoff.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid bool.
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Request cancellation and wake any pending wait.
    pub fn cancel(&self) {
        *self.flag() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Block for up to `timeout`; returns `true` if cancelled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.flag();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match self.inner.wake.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *cancelled
    }
}

/// Time source for the polling loop.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Pause for `duration`, returning early if `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken);
}

/// Wall-clock time with blocking sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) {
        cancel.wait_timeout(duration);
    }
}

/// Virtual time that advances only when slept on.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().expect("mock clock mutex poisoned") += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().expect("mock clock mutex poisoned")
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("mock clock mutex poisoned").clone()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) {
        self.sleeps
            .lock()
            .expect("mock clock mutex poisoned")
            .push(duration);
        if !cancel.is_cancelled() {
            self.advance(duration);
        }
    }
}
