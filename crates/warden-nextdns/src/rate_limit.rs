//! Client-side sliding-window rate limiter.
//!
//! At most `max_requests` sends per `window`, measured on a monotonic
//! clock. Exhausted capacity blocks the caller (async) until the
//! oldest stamp ages out; worst case is one full window.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_MAX_REQUESTS: usize = 30;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a request slot and claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                match stamps.front().copied() {
                    Some(oldest) if stamps.len() >= self.max_requests => {
                        // Lock released before sleeping so concurrent
                        // callers queue behind the same window.
                        self.window - now.duration_since(oldest)
                    }
                    _ => {
                        stamps.push_back(now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn in_flight_window(&self) -> usize {
        let mut stamps = self.stamps.lock().await;
        let now = Instant::now();
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_REQUESTS,
            Duration::from_secs(DEFAULT_WINDOW_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_flight_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_window_frees() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        // Paused-clock tokio auto-advances across the sleep.
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(59), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(61), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_all_complete() {
        let limiter = std::sync::Arc::new(RateLimiter::new(2, Duration::from_secs(10)));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
