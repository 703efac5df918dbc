//! Fixed-window request throttling.
//!
//! The [`Throttler`] admits at most `max_requests` requests per window,
//! measured from the moment the window opened. A request that finds the
//! quota exhausted waits `min(backoff_factor * base_backoff, max_backoff)`,
//! grows the factor and checks again, until the window rolls over.
//!
//! Bursts of up to twice the quota are possible across a window boundary;
//! the window is fixed, not sliding.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::ThrottleConfig;

const BASE_BACKOFF_FACTOR: f64 = 1.0;

/// Counters for the current window. Lives for the process lifetime only.
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    pub request_count: u32,
    pub window_start: Instant,
    pub max_requests: u32,
    pub window_duration: Duration,
    pub backoff_factor: f64,
}

impl RateLimiterState {
    fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            request_count: 0,
            window_start: Instant::now(),
            max_requests,
            window_duration,
            backoff_factor: BASE_BACKOFF_FACTOR,
        }
    }

    /// Starts a fresh window if the current one has run its course.
    fn roll_window(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window_duration {
            self.request_count = 0;
            self.window_start = now;
            self.backoff_factor = BASE_BACKOFF_FACTOR;
            true
        } else {
            false
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.request_count >= self.max_requests
    }
}

pub struct Throttler {
    config: ThrottleConfig,
    state: Mutex<RateLimiterState>,
}

impl Throttler {
    pub fn new(config: ThrottleConfig) -> Self {
        let mut config = config;
        config.max_requests = config.max_requests.max(1);
        if config.backoff_growth.is_nan() || config.backoff_growth < 1.0 {
            config.backoff_growth = 1.0;
        }
        // A zero backoff would spin on the lock until the window rolls over.
        config.base_backoff_ms = config.base_backoff_ms.max(1);
        config.max_backoff_ms = config.max_backoff_ms.max(1);
        let state = RateLimiterState::new(config.max_requests, config.window());
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Waits until a request may be dispatched, then consumes one slot of the
    /// current window and applies the flat spacing delay.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                if state.roll_window(Instant::now()) {
                    debug!("Throttle window rolled over");
                }

                if state.is_throttled() {
                    let delay = self.backoff_delay(state.backoff_factor);
                    state.backoff_factor *= self.config.backoff_growth;
                    Some((delay, state.request_count))
                } else {
                    state.request_count += 1;
                    None
                }
            };

            match wait {
                None => {
                    sleep(self.config.spacing()).await;
                    return;
                }
                Some((delay, count)) => {
                    warn!(
                        requests = count,
                        backoff_ms = delay.as_millis() as u64,
                        "Request quota exhausted, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn backoff_delay(&self, factor: f64) -> Duration {
        let base = self.config.base_backoff().as_millis() as f64;
        let max = self.config.max_backoff().as_millis() as f64;
        Duration::from_millis((factor * base).min(max).max(0.0).round() as u64)
    }

    pub async fn snapshot(&self) -> RateLimiterState {
        self.state.lock().await.clone()
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_config() -> ThrottleConfig {
        ThrottleConfig {
            max_requests: 5,
            window_ms: 1_000,
            spacing_ms: 10,
            base_backoff_ms: 100,
            backoff_growth: 2.0,
            max_backoff_ms: 500,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_quota_only_pays_spacing() {
        let throttler = Throttler::new(test_config());
        let start = Instant::now();

        throttler.acquire().await;
        throttler.acquire().await;

        assert_eq!(start.elapsed(), Duration::from_millis(20));
        assert_eq!(throttler.snapshot().await.request_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seven_rapid_calls_split_across_windows() {
        let throttler = Arc::new(Throttler::new(test_config()));
        let start = Instant::now();

        let tasks: Vec<_> = (0..7)
            .map(|_| {
                let throttler = Arc::clone(&throttler);
                tokio::spawn(async move {
                    throttler.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for task in tasks {
            elapsed.push(task.await.expect("task should not panic"));
        }

        let window = Duration::from_millis(1_000);
        let immediate = elapsed.iter().filter(|e| **e < window).count();
        let delayed: Vec<_> = elapsed.iter().filter(|e| **e >= window).collect();
        assert_eq!(immediate, 5);
        assert_eq!(delayed.len(), 2);
        assert!(delayed.iter().all(|e| **e < window * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_and_is_capped() {
        let throttler = Throttler::new(test_config());
        assert_eq!(throttler.backoff_delay(1.0), Duration::from_millis(100));
        assert_eq!(throttler.backoff_delay(4.0), Duration::from_millis(400));
        assert_eq!(throttler.backoff_delay(64.0), Duration::from_millis(500));
        assert_eq!(throttler.backoff_delay(f64::INFINITY), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rollover_resets_counters() {
        let throttler = Throttler::new(test_config());
        for _ in 0..5 {
            throttler.acquire().await;
        }
        assert!(throttler.snapshot().await.is_throttled());

        // Sixth call has to wait for the next window
        throttler.acquire().await;

        let state = throttler.snapshot().await;
        assert_eq!(state.request_count, 1);
        assert_eq!(state.backoff_factor, BASE_BACKOFF_FACTOR);
        assert!(!state.is_throttled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_backoff_is_clamped() {
        let throttler = Throttler::new(ThrottleConfig {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            ..test_config()
        });
        assert_eq!(throttler.config().base_backoff(), Duration::from_millis(1));
        assert_eq!(throttler.backoff_delay(1.0), Duration::from_millis(1));
        assert_eq!(throttler.backoff_delay(64.0), Duration::from_millis(1));

        let start = Instant::now();
        for _ in 0..6 {
            throttler.acquire().await;
        }
        // Every throttled check waits on the clock, so the sixth call only
        // goes out once the window has rolled over.
        assert!(start.elapsed() >= Duration::from_millis(1_000));
        assert_eq!(throttler.snapshot().await.request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_quota_is_clamped() {
        let throttler = Throttler::new(ThrottleConfig {
            max_requests: 0,
            ..test_config()
        });
        throttler.acquire().await;
        assert_eq!(throttler.snapshot().await.request_count, 1);
    }
}
