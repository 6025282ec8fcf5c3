//! Retry/backoff primitive (C5).
//!
//! §9's redesign note replaces "retry via decorator" with a first-class
//! `retry(op, classifier, policy)` function. The policy record is
//! [`RetryPolicy`]; the classifier is any `Fn(&Error) -> bool` — it must be
//! pure (§4.5: "no side effects in the retry loop other than sleeping and
//! re-invoking").
//!
//! Grounded in the original's `_backoff` (`mcp/tools/slides.py`: log a
//! warning with the computed delay before sleeping, re-raise immediately on
//! a non-retryable error or attempt exhaustion) and in
//! `sa_node_sdk::reconnect::ReconnectBackoff`'s exponential-with-cap shape.

use std::time::Duration;

use reportdeck_domain::Error;

/// `{attempts, base, max, cap}` from §4.5 / §9.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts (including the first), default 4.
    pub attempts: u32,
    /// Base delay for the exponential backoff, default 0.6s.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base: Duration::from_millis(600),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &reportdeck_domain::config::RetryConfig) -> Self {
        Self {
            attempts: cfg.attempts,
            base: Duration::from_secs_f64(cfg.base_secs),
            cap: Duration::from_secs_f64(cfg.cap_secs),
        }
    }

    /// Delay before the `(i+1)`-th attempt, 0-indexed over prior failures.
    pub fn delay_for_attempt(&self, i: u32) -> Duration {
        let base_ms = self.base.as_secs_f64() * 1000.0;
        let delay_ms = base_ms * 2f64.powi(i as i32);
        let capped_ms = delay_ms.min(self.cap.as_secs_f64() * 1000.0);
        Duration::from_secs_f64(capped_ms / 1000.0)
    }
}

/// Run `op` up to `policy.attempts` times. `classifier` decides whether a
/// given error is worth retrying; non-retryable errors bubble immediately,
/// as do attempts that exhaust the budget.
pub async fn retry<F, Fut, T, C>(policy: &RetryPolicy, classifier: C, mut op: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
    C: Fn(&Error) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let is_last = attempt + 1 >= policy.attempts;
                if is_last || !classifier(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// The retryable-status classifier named in §4.5: HTTP-like status codes
/// in {429, 500, 502, 503, 504} are transient; everything else is not.
pub fn is_retryable_http_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Classifier that treats any `Error` tagged `BackendTransient` as
/// retryable — the common case for tool backends (§4.5, §4.6 step 6).
pub fn retryable_by_kind(err: &Error) -> bool {
    err.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let p = RetryPolicy {
            attempts: 4,
            base: Duration::from_millis(600),
            cap: Duration::from_secs(30),
        };
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(600));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(1200));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(2400));

        let capped = RetryPolicy {
            attempts: 10,
            base: Duration::from_secs(10),
            cap: Duration::from_secs(30),
        };
        assert_eq!(capped.delay_for_attempt(5), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_envelope_is_4_2_seconds_for_default_policy() {
        // §8 property 8: attempts=4, base=0.6 -> total sleep 0.6+1.2+2.4 = 4.2s
        // before giving up on the 4th (final) failure.
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(&policy, retryable_by_kind, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::backend_transient("still failing")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(4200));
    }

    #[tokio::test]
    async fn non_retryable_error_bubbles_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(&policy, retryable_by_kind, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::bad_request("nope")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result = retry(&policy, retryable_by_kind, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::backend_transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retryable_http_status_matches_spec_set() {
        for s in [429, 500, 502, 503, 504] {
            assert!(is_retryable_http_status(s));
        }
        for s in [200, 400, 401, 403, 404] {
            assert!(!is_retryable_http_status(s));
        }
    }
}
