//! Bounded retry with exponential backoff.

use crate::config::ResilienceParams;
use crew_domain::ExternalFailure;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Run `call` until it succeeds, fails terminally, or the retry budget is
/// spent.
///
/// Only [`ExternalFailure::Transient`] failures are retried. Exhausting
/// either `max_attempts` or `max_elapsed` converts the last transient
/// failure into [`ExternalFailure::Terminal`]. The closure receives the
/// 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    params: &ResilienceParams,
    operation: &str,
    mut call: F,
) -> Result<T, ExternalFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExternalFailure>>,
{
    let started = Instant::now();
    let max_attempts = params.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match call(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(ExternalFailure::terminal(format!(
                "{} failed after {} attempts: {}",
                operation,
                attempt,
                error.message()
            )));
        }

        let delay = params.delay_after(attempt);
        if started.elapsed().saturating_add(delay) > params.max_elapsed {
            return Err(ExternalFailure::terminal(format!(
                "{} gave up after {} attempts ({:?} retry budget spent): {}",
                operation,
                attempt,
                params.max_elapsed,
                error.message()
            )));
        }

        warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = error.message(),
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
