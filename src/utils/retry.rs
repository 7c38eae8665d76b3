use crate::error::NetError;
use std::future::Future;
use std::time::Duration;

const RETRY_ERR_MAX_LEN: usize = 260;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 1_000,
            cap_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts; used by tests and fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_ms: 0,
            cap_ms: 0,
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(bounded_exponential_backoff_ms(
            self.base_ms,
            attempt - 1,
            self.cap_ms,
        ))
    }
}

pub fn bounded_exponential_backoff_ms(base_ms: u64, streak: u32, cap_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let clamped = streak.min(8);
    base_ms
        .saturating_mul(1u64 << clamped)
        .min(cap_ms.max(base_ms))
}

/// Map an HTTP status onto the retry taxonomy: 5xx and 429 are worth retrying.
pub fn classify_status(context: &str, status: u16, body: &str) -> NetError {
    let message = format!(
        "HTTP {status}: {}",
        crate::utils::error::compact_error_message(body, RETRY_ERR_MAX_LEN)
    );
    if status == 429 || (500..=599).contains(&status) {
        NetError::transient(context, message)
    } else {
        NetError::permanent(context, message)
    }
}

/// Timeouts and connection failures are retryable; anything else reqwest reports is not.
pub fn transport_error(context: &str, err: &reqwest::Error) -> NetError {
    let message = crate::utils::error::compact_error_message(&err.to_string(), RETRY_ERR_MAX_LEN);
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        NetError::transient(context, message)
    } else {
        NetError::permanent(context, message)
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    context: &str,
    mut op: F,
) -> Result<T, NetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::debug!(
                    "[RETRY] {} attempt {}/{} failed: {}",
                    context,
                    attempt + 1,
                    attempts,
                    err
                );
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| NetError::transient(context, "no attempts made")))
}
