//! Per-channel send admission under a messages-per-minute budget.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    started: Instant,
    admitted: u32,
}

/// Fixed-window admission control. `admit` suspends the caller until a slot
/// is free; it never fails.
///
/// The window lock is held while waiting, so callers sharing one limiter are
/// admitted one at a time in lock-acquisition (FIFO) order.
#[derive(Debug)]
pub struct RateLimiter {
    label: &'static str,
    max_per_window: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn per_minute(label: &'static str, max_per_minute: u32) -> Self {
        Self::with_window(label, max_per_minute, MINUTE)
    }

    pub fn with_window(label: &'static str, max_per_window: u32, window: Duration) -> Self {
        Self {
            label,
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                admitted: 0,
            }),
        }
    }

    pub fn budget(&self) -> u32 {
        self.max_per_window
    }

    pub async fn admit(&self) {
        let mut window = self.state.lock().await;
        let now = Instant::now();
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.admitted = 0;
        }
        if window.admitted < self.max_per_window {
            window.admitted += 1;
            return;
        }

        let wait = self
            .window
            .saturating_sub(now.duration_since(window.started));
        debug!(
            limiter = self.label,
            wait_ms = wait.as_millis() as u64,
            budget = self.max_per_window,
            "Rate limit reached, waiting for next window"
        );
        metrics::counter!("rate_limiter.waits", "channel" => self.label).increment(1);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        window.started = Instant::now();
        window.admitted = 1;
    }
}
