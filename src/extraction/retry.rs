//! Bounded retry with linear backoff for extraction requests.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::transport::{TransportError, TransportResponse};
use super::ExtractionError;

/// Attempts per request, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff grows by this much per failed attempt.
pub const BACKOFF_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_step: BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `attempt * backoff_step`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Send until a success status comes back or the attempt budget is spent.
///
/// `make_request` is called once per attempt and must produce a fresh request.
/// Non-success statuses and transport errors are retried; the body of a
/// success response is returned as-is for the caller to parse.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    make_request: F,
) -> Result<String, ExtractionError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<TransportResponse, TransportError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let failure = match make_request().await {
            Ok(response) if response.status.is_success() => {
                debug!("Extraction request succeeded on attempt {}", attempt);
                return Ok(response.body);
            }
            Ok(response) => {
                if attempt >= max_attempts {
                    return Err(ExtractionError::Status {
                        status: response.status.as_u16(),
                        body: response.body,
                        attempts: attempt,
                    });
                }
                format!("HTTP {}", response.status)
            }
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(ExtractionError::Request {
                        message: e.0,
                        attempts: attempt,
                    });
                }
                e.0
            }
        };

        let wait = policy.backoff_delay(attempt);
        warn!(
            "Extraction attempt {}/{} failed ({}), retrying in {:?}",
            attempt, max_attempts, failure, wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
