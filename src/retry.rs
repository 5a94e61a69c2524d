use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::Error;

/// Classifies an error as transient (worth another attempt) or permanent.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            // Server trouble and throttling are worth another try; 4xx is not
            Error::Status { status, .. } => *status >= 500 || *status == 429,
            Error::EmptyBody { .. } | Error::MalformedBody { .. } => true,
            Error::InvalidPayload(_)
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Csv(_)
            | Error::Pattern(_) => false,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the retry budget is spent.
///
/// Returns the last error once `config.max_retries` retries have failed.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "Retry budget exhausted");
                } else {
                    tracing::debug!(error = %e, "Request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Grows `delay` by the backoff multiplier, capped at `max_delay`.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    scale(delay, config.backoff_multiplier, config.max_delay).min(config.max_delay)
}

/// Stretches `delay` by a random factor in [1, 2].
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.0..=1.0);
    scale(delay, 1.0 + factor, Duration::MAX)
}

/// `delay * factor`, or `overflow` when the product is not a valid duration.
fn scale(delay: Duration, factor: f64, overflow: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_config(3), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> = with_retry(&fast_config(2), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> = with_retry(&fast_config(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Permanent)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classifies_service_errors() {
        let url = "http://example.com".to_string();
        assert!(Error::Status { status: 503, url: url.clone() }.is_retryable());
        assert!(Error::Status { status: 429, url: url.clone() }.is_retryable());
        assert!(!Error::Status { status: 404, url: url.clone() }.is_retryable());
        assert!(Error::EmptyBody { url: url.clone() }.is_retryable());
        assert!(Error::MalformedBody { url, message: "eof".to_string() }.is_retryable());
        assert!(!Error::InvalidPayload("not an object".to_string()).is_retryable());
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let config = fast_config(3);
        assert_eq!(next_delay(Duration::from_millis(1), &config), Duration::from_millis(2));
        assert_eq!(next_delay(Duration::from_millis(3), &config), Duration::from_millis(4));
    }

    #[test]
    fn huge_multiplier_does_not_overflow() {
        let config = RetryConfig {
            backoff_multiplier: f64::MAX,
            max_delay: Duration::from_secs(8),
            ..fast_config(3)
        };
        assert_eq!(next_delay(Duration::from_secs(1), &config), Duration::from_secs(8));
    }

    #[test]
    fn jitter_on_huge_delay_does_not_overflow() {
        let huge = Duration::from_secs(u64::MAX);
        assert_eq!(add_jitter(huge), Duration::MAX);
    }

    #[test]
    fn jitter_stays_within_double() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(base);
            assert!(jittered >= base && jittered <= base * 2);
        }
    }
}
