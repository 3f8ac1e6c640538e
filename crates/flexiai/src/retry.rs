use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use flexiai_config::RetryConfig;
use flexiai_core::Result;

/// Delay before the retry that follows attempt `attempt` (1-indexed):
/// exponential from `base_delay_ms`, capped at `max_delay_ms`, with uniform
/// jitter of `±jitter_fraction` applied after the cap.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp.min(config.max_delay_ms);
    let jitter = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * config.jitter_fraction;
    Duration::from_millis((capped as f64 * jitter).max(0.0) as u64)
}

/// Run one adapter invocation with bounded retry on transient errors.
///
/// Permanent errors (auth, validation, content policy) return immediately.
/// If the caller's deadline would elapse before a backoff sleep completes,
/// the last observed error is returned without sleeping. Returns the final
/// result and the number of attempts made.
pub(crate) async fn invoke_with_retry<T, F, Fut>(
    provider: &str,
    config: &RetryConfig,
    deadline: Option<Instant>,
    mut op: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return (Ok(value), attempts),
            Err(e) if e.is_transient() && attempts < config.max_attempts => {
                let delay = backoff_delay(config, attempts);
                if let Some(d) = deadline {
                    if Instant::now() + delay >= d {
                        warn!(
                            provider,
                            attempt = attempts,
                            "deadline would elapse during backoff, giving up"
                        );
                        return (Err(e), attempts);
                    }
                }
                warn!(
                    provider,
                    attempt = attempts,
                    max = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return (Err(e), attempts),
        }
    }
}
