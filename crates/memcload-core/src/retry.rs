//! Fixed-delay retry for store writes

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Attempts made by [`RetryPolicy::default`]
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Pause between attempts for [`RetryPolicy::default`]
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// Something that can block the current thread for a while.
///
/// Tests swap in a recorder so they do not have to wait out real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded retry with a fixed delay between attempts (no backoff, no jitter).
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    /// `max_attempts` total tries (clamped to at least one), `delay` between them.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper (tests use a zero-delay recorder).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt_fn` until it succeeds or the budget is spent.
    ///
    /// `attempt_fn` receives the 1-based attempt number. Sleeps only between
    /// attempts, never after the last one. Returns the last error on exhaustion.
    pub fn run<T, E: Display>(
        &self,
        label: &str,
        mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 1u32;
        loop {
            match attempt_fn(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts => {
                    log::debug!(
                        "{label}: attempt {attempt}/{} failed: {e}, retrying...",
                        self.max_attempts
                    );
                    self.sleeper.sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
