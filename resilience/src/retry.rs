use crate::failure::{FailureClass, MAX_SERVER_DELAY, server_delay};
use crate::telemetry::ResilienceTelemetry;
use config::ResilienceConfig;
use errors::CallError;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Backoff is scaled by a random factor in `1 ± jitter_ratio`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Same ceiling and jitter with a different attempt budget and base delay.
    pub fn with_attempts(self, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..self
        }
    }

    /// `base * 2^(attempt - 1)` with jitter, capped at `max_delay`.
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let nominal = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let jitter = self.jitter_ratio.clamp(0.0, 1.0) * (2.0 * rand::random::<f64>() - 1.0);
        let jittered = (nominal * (1.0 + jitter)).max(0.0);
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub exhausted_operations: u64,
    pub rate_limit_hits: u64,
}

/// Retries remote calls whose failures look recoverable.
///
/// Errors are classified from their `Display` text by [`FailureClass`].
/// Rate limits sleep for the server-suggested delay when the message has
/// one, otherwise for the policy backoff. Transient failures always use the
/// backoff. Fatal errors are returned at once, and once the attempts run out
/// the last error is returned.
#[derive(Debug, Default)]
pub struct ResilientCaller {
    policy: RetryPolicy,
    total_retries: AtomicU64,
    successful_retries: AtomicU64,
    exhausted_operations: AtomicU64,
    rate_limit_hits: AtomicU64,
    telemetry: ResilienceTelemetry,
}

impl ResilientCaller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn call<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, CallError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with(operation, self.policy, f).await
    }

    pub async fn call_with<T, E, F, Fut>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut f: F,
    ) -> Result<T, CallError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let reason = match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        self.telemetry.record_recovered(operation);
                        tracing::info!(operation, attempt, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e.to_string(),
            };

            let class = FailureClass::classify(&reason);
            if class == FailureClass::RateLimited {
                self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            }
            self.telemetry.record_failure(operation, class.as_str());

            if !class.is_retryable() {
                tracing::warn!(operation, attempt, error = %reason, "Remote call failed permanently");
                return Err(class.into_error(reason));
            }

            if attempt >= max_attempts {
                self.exhausted_operations.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_exhausted(operation);
                tracing::error!(
                    operation,
                    attempts = attempt,
                    class = class.as_str(),
                    error = %reason,
                    "Remote call failed after all attempts"
                );
                return Err(class.into_error(reason));
            }

            let suggested = match class {
                FailureClass::RateLimited => server_delay(&reason)
                    .map(|requested| bounded_server_delay(operation, requested)),
                _ => None,
            };
            let delay = suggested.unwrap_or_else(|| policy.backoff(attempt));

            self.total_retries.fetch_add(1, Ordering::Relaxed);
            self.telemetry.record_retry(operation, class.as_str(), delay);
            tracing::warn!(
                operation,
                attempt,
                max_attempts,
                class = class.as_str(),
                delay_ms = delay.as_millis() as u64,
                server_suggested = suggested.is_some(),
                error = %reason,
                "Retrying remote call"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            exhausted_operations: self.exhausted_operations.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
        }
    }
}

fn bounded_server_delay(operation: &str, requested: Duration) -> Duration {
    if requested <= MAX_SERVER_DELAY {
        return requested;
    }
    tracing::warn!(
        operation,
        requested_ms = requested.as_millis() as u64,
        ceiling_ms = MAX_SERVER_DELAY.as_millis() as u64,
        "Server-suggested retry delay capped"
    );
    MAX_SERVER_DELAY
}
