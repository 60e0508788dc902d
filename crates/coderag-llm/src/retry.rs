use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

/// Bounded exponential backoff for transient embedding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`: `base_delay << attempt`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Parse the `Retry-After` header value as seconds, falling back to exponential backoff.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32, policy: &RetryPolicy) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs).min(policy.max_delay);
    }
    policy.backoff(attempt)
}

fn is_transient_transport(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

/// Send an HTTP request, retrying transient failures under `policy`.
///
/// Network errors, timeouts, 429 and 5xx responses are retried with
/// exponential backoff. Any other response (success or 4xx) is returned to the
/// caller for classification.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` or `LlmError::Server` when retries are
/// exhausted on a 429/5xx, and `LlmError::Http` for transport failures.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &'static str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..=policy.max_retries {
        let last = attempt == policy.max_retries;

        let response = match f().await {
            Ok(response) => response,
            Err(e) => {
                if last || !is_transient_transport(&e) {
                    return Err(LlmError::Http(e));
                }
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    provider = provider_name,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "request failed ({e}), retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if last {
                return Err(LlmError::RateLimited);
            }
            let delay = retry_delay(&response, attempt, policy);
            tracing::warn!(
                provider = provider_name,
                attempt = attempt + 1,
                max_retries = policy.max_retries,
                "rate limited, retrying in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if status.is_server_error() {
            if last {
                return Err(LlmError::Server {
                    provider: provider_name,
                    status: status.as_u16(),
                });
            }
            let delay = retry_delay(&response, attempt, policy);
            tracing::warn!(
                provider = provider_name,
                status = status.as_u16(),
                attempt = attempt + 1,
                max_retries = policy.max_retries,
                "server error, retrying in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Ok(response);
    }

    Err(LlmError::RateLimited)
}
