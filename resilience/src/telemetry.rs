use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Mirrors retry and circuit events to the `metrics` recorder.
#[derive(Debug, Default)]
pub struct ResilienceTelemetry {
    _private: (),
}

impl ResilienceTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self, operation: &str, class: &'static str) {
        counter!("resilient_call_failures_total",
            "operation" => operation.to_string(),
            "class" => class
        )
        .increment(1);
    }

    pub fn record_retry(&self, operation: &str, class: &'static str, delay: Duration) {
        counter!("resilient_call_retries_total",
            "operation" => operation.to_string(),
            "class" => class
        )
        .increment(1);
        histogram!("resilient_call_backoff_seconds", "class" => class).record(delay.as_secs_f64());
    }

    pub fn record_recovered(&self, operation: &str) {
        counter!("resilient_call_recovered_total", "operation" => operation.to_string())
            .increment(1);
    }

    pub fn record_exhausted(&self, operation: &str) {
        counter!("resilient_call_exhausted_total", "operation" => operation.to_string())
            .increment(1);
    }

    pub fn record_circuit_state(&self, name: &str, state: &'static str) {
        let open = if state == "open" { 1.0 } else { 0.0 };
        gauge!("circuit_breaker_open", "breaker" => name.to_string()).set(open);
        counter!("circuit_breaker_transitions_total",
            "breaker" => name.to_string(),
            "state" => state
        )
        .increment(1);
    }

    pub fn record_rejected(&self, name: &str) {
        counter!("circuit_breaker_rejections_total", "breaker" => name.to_string()).increment(1);
    }
}
