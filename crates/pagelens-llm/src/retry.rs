//! Retry with configurable backoff for generation requests.
//!
//! Retries live entirely inside the client; callers see either the eventual
//! response or the final error.

use std::future::Future;
use std::time::Duration;

use pagelens_types::PagelensError;

/// Upper bound on a provider-requested wait when the policy sets none.
const MAX_PROVIDER_DELAY: Duration = Duration::from_secs(30);

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = base.as_millis() as u64 * 2u64.saturating_pow(attempt as u32);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }

    /// Longest wait a provider's `retry_after` hint may impose.
    pub fn ceiling(&self) -> Duration {
        match self {
            BackoffPolicy::Exponential { max, .. } => *max,
            BackoffPolicy::Fixed(d) => (*d).max(MAX_PROVIDER_DELAY),
            BackoffPolicy::None => MAX_PROVIDER_DELAY,
        }
    }

    /// Delay before retrying after `err`. A provider-supplied `retry_after`
    /// wins when it is longer than the policy delay, up to [`ceiling`](Self::ceiling).
    fn delay_after(&self, attempt: usize, err: &PagelensError) -> Duration {
        let policy_delay = self.delay_for_attempt(attempt);
        match err {
            PagelensError::RateLimited { retry_after_ms, .. } => {
                let hinted = Duration::from_millis(*retry_after_ms).min(self.ceiling());
                policy_delay.max(hinted)
            }
            _ => policy_delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Run `f` up to `max_retries + 1` times, retrying only errors for which
/// [`PagelensError::is_retryable`] holds.
pub async fn complete_with_retry<T, F, Fut>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
) -> Result<T, PagelensError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, PagelensError>>,
{
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_after(attempt, &e);
                tracing::warn!(
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable generation error, retrying"
                );
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(PagelensError::RetriesExhausted {
        attempts: max_retries + 1,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> PagelensError {
        PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0,
        }
    }

    #[tokio::test]
    async fn success_on_first_try() {
        let result = complete_with_retry(|| async { Ok::<_, PagelensError>(7) }, 3, &BackoffPolicy::None).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retry_on_retryable_error_succeeds() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = complete_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(rate_limited())
                    } else {
                        Ok("second time lucky")
                    }
                }
            },
            3,
            &BackoffPolicy::None,
        )
        .await;

        assert_eq!(result.unwrap(), "second time lucky");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result: Result<(), _> = complete_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(PagelensError::AuthError {
                        provider: "x".into(),
                    })
                }
            },
            3,
            &BackoffPolicy::None,
        )
        .await;

        assert!(matches!(result, Err(PagelensError::AuthError { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result: Result<(), _> = complete_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            },
            2,
            &BackoffPolicy::None,
        )
        .await;

        assert!(matches!(result, Err(PagelensError::RateLimited { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_retry_after_extends_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(10));
        let err = PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 250,
        };
        assert_eq!(policy.delay_after(0, &err), Duration::from_millis(250));
        assert_eq!(
            policy.delay_after(0, &PagelensError::Other("x".into())),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn retry_after_hint_is_clamped_to_policy_max() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
        };
        let day = PagelensError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 86_400_000,
        };
        assert_eq!(policy.delay_after(0, &day), Duration::from_secs(2));
        assert_eq!(BackoffPolicy::None.delay_after(0, &day), MAX_PROVIDER_DELAY);
        assert_eq!(
            BackoffPolicy::Fixed(Duration::from_millis(10)).delay_after(0, &day),
            MAX_PROVIDER_DELAY
        );
    }
}
