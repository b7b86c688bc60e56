//! # Resilience
//!
//! Retry and circuit-breaking for calls to remote dependencies whose errors
//! arrive as opaque text.

pub mod circuit_breaker;
pub mod failure;
pub mod retry;
pub mod telemetry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use failure::{FailureClass, MAX_SERVER_DELAY, server_delay};
pub use retry::{ResilientCaller, RetryPolicy, RetryStats};
pub use telemetry::ResilienceTelemetry;
