//! Restartable single-shot idle deadline.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};

/// A cancellable countdown that fires once per arm.
///
/// The timer holds no notification queue: [`fired`](IdleTimer::fired) only
/// completes while the timer is armed, so once [`disarm`](IdleTimer::disarm)
/// returns there is nothing stale left to observe. Re-arming always restarts
/// the full duration.
#[derive(Debug)]
pub struct IdleTimer {
    duration: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl IdleTimer {
    /// Create a disarmed timer.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            sleep: Box::pin(sleep_until(Instant::now() + duration)),
            armed: false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Start counting down the full duration from now.
    pub fn arm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.duration);
        self.armed = true;
    }

    /// Cancel any pending countdown. Safe to call at any time.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Wait until the armed countdown elapses; pends forever while disarmed.
    ///
    /// Cancel safe: dropping the future leaves the countdown untouched. On
    /// completion the timer is disarmed.
    pub async fn fired(&mut self) {
        if !self.armed {
            std::future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
