//! Retry with exponential backoff and jitter.
//!
//! Base 1 s, factor 2, capped at 30 s, plus uniform [0, 1) s of jitter.
//! A 429 with a Retry-After hint obeys the hint up to 60 s instead.

use crate::error::RemoteError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: usize = 3;

const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 30;
const RETRY_AFTER_CAP_SECS: u64 = 60;

/// Backoff for the given zero-based attempt, before jitter.
fn backoff_for_attempt(attempt: usize) -> Duration {
    let exp = BACKOFF_BASE_SECS.saturating_mul(1u64 << attempt.min(10));
    Duration::from_secs(exp.min(BACKOFF_CAP_SECS))
}

/// Wait time before retry number `attempt`, honoring a server hint.
pub fn retry_delay(attempt: usize, hint: Option<Duration>) -> Duration {
    if let Some(hint) = hint {
        return hint.min(Duration::from_secs(RETRY_AFTER_CAP_SECS));
    }
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    backoff_for_attempt(attempt) + jitter
}

/// Run `operation` with up to `max_retries` retries on transient
/// failures. Permanent failures surface immediately.
pub async fn with_retries<T, F, Fut>(
    label: &str,
    max_retries: usize,
    mut operation: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let hint = match &err {
                    RemoteError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = retry_delay(attempt, hint);
                tracing::warn!(
                    "{label}: {err}; retry {}/{max_retries} in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_progression() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(4), Duration::from_secs(16));
        // Capped at 30s from attempt 5 on.
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(30));
        assert_eq!(backoff_for_attempt(12), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds() {
        for attempt in 0..4 {
            let base = backoff_for_attempt(attempt);
            for _ in 0..50 {
                let delay = retry_delay(attempt, None);
                assert!(delay >= base);
                assert!(delay < base + Duration::from_secs(1));
            }
        }
    }

    #[test]
    fn test_retry_after_hint_capped() {
        assert_eq!(
            retry_delay(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            retry_delay(0, Some(Duration::from_secs(300))),
            Duration::from_secs(60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_then_succeed() {
        let calls = AtomicUsize::new(0);
        let result = with_retries("test", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RemoteError::Server { status: 503 })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_fails_fast() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retries("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::Unauthorized) }
        })
        .await;
        assert!(matches!(result, Err(RemoteError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retries("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::Timeout) }
        })
        .await;
        assert!(matches!(result, Err(RemoteError::Timeout)));
        // Initial call plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
