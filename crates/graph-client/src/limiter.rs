//! Sliding-window rate limiter
//!
//! Keeps the instants of the calls made within the trailing `period`. When
//! the window already holds `max_calls` entries, the caller sleeps until the
//! oldest entry ages out. The window lock is held across that sleep, so
//! concurrent callers queue up instead of racing the prune/append sequence.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// At most `max_calls` calls per rolling `period`.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Build a limiter. Fails on `max_calls == 0` or a zero period.
    pub fn new(max_calls: usize, period: Duration) -> Result<Self> {
        if max_calls == 0 {
            return Err(Error::InvalidConfig(
                "rate limit max_calls must be greater than 0".into(),
            ));
        }
        if period.is_zero() {
            return Err(Error::InvalidConfig(
                "rate limit period must be greater than 0".into(),
            ));
        }
        Ok(Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
        })
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until another call fits in the window, record it, and return how
    /// long the caller was held back (zero if not at all).
    pub async fn throttle(&self) -> Duration {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        prune(&mut window, now, self.period);

        let mut waited = Duration::ZERO;
        if window.len() >= self.max_calls {
            if let Some(&oldest) = window.front() {
                let wait = self.period.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        in_window = window.len(),
                        "rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    waited = wait;
                }
            }
            prune(&mut window, Instant::now(), self.period);
        }

        window.push_back(Instant::now());
        waited
    }

    /// Number of calls currently counted in the window.
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now(), self.period);
        window.len()
    }
}

/// Drop entries that are `period` old or older.
fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&front) = window.front() {
        if now.duration_since(front) >= period {
            window.pop_front();
        } else {
            break;
        }
    }
}
