use crate::telemetry::ResilienceTelemetry;
use config::ResilienceConfig;
use errors::CallError;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

/// Stops calling a failing dependency for `reset_timeout` after
/// `failure_threshold` consecutive failures.
///
/// Once the timeout passes, calls are let through again (half-open). The
/// first outcome decides: success closes the circuit, failure reopens it.
pub struct CircuitBreaker {
    name: String,
    phase: Mutex<Phase>,
    failure_threshold: u32,
    reset_timeout: Duration,
    telemetry: ResilienceTelemetry,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            phase: Mutex::new(Phase::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            telemetry: ResilienceTelemetry::new(),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self::new(name, config.circuit_failure_threshold, config.circuit_reset())
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase.lock() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.admit()?;
        let result = f().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(e) => self.on_failure(e),
        }
        result
    }

    fn admit(&self) -> Result<(), CallError> {
        let mut phase = self.phase.lock();
        if let Phase::Open { opened_at } = *phase {
            let elapsed = opened_at.elapsed();
            if elapsed < self.reset_timeout {
                self.telemetry.record_rejected(&self.name);
                return Err(CallError::CircuitOpen {
                    retry_in_ms: (self.reset_timeout - elapsed).as_millis() as u64,
                });
            }
            *phase = Phase::HalfOpen;
            drop(phase);
            self.transitioned(CircuitState::HalfOpen);
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::HalfOpen => {
                *phase = Phase::Closed {
                    consecutive_failures: 0,
                };
                drop(phase);
                self.transitioned(CircuitState::Closed);
            }
            Phase::Closed { .. } => {
                *phase = Phase::Closed {
                    consecutive_failures: 0,
                };
            }
            Phase::Open { .. } => {}
        }
    }

    fn on_failure(&self, error: &CallError) {
        let mut phase = self.phase.lock();
        let reopen = match *phase {
            Phase::HalfOpen => true,
            Phase::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                *phase = Phase::Closed {
                    consecutive_failures: failures,
                };
                failures >= self.failure_threshold
            }
            Phase::Open { .. } => false,
        };

        if reopen {
            *phase = Phase::Open {
                opened_at: Instant::now(),
            };
            drop(phase);
            tracing::error!(breaker = %self.name, error = %error, "Circuit breaker opened");
            self.transitioned(CircuitState::Open);
        }
    }

    fn transitioned(&self, state: CircuitState) {
        self.telemetry.record_circuit_state(&self.name, state.as_str());
        tracing::info!(breaker = %self.name, state = state.as_str(), "Circuit breaker state changed");
    }
}
