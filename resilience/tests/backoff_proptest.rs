use proptest::prelude::*;
use resilience::{FailureClass, RetryPolicy, server_delay};
use std::time::Duration;

proptest! {
    #[test]
    fn backoff_never_exceeds_ceiling(
        attempt in 1u32..64,
        base_ms in 0u64..5_000,
        max_ms in 1u64..60_000,
        jitter in 0.0f64..=1.0
    ) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter_ratio: jitter,
        };
        prop_assert!(policy.backoff(attempt) <= policy.max_delay);
    }

    #[test]
    fn backoff_stays_within_jitter_band(attempt in 1u32..8, base_ms in 1u64..1_000) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(3_600),
            jitter_ratio: 0.25,
        };
        let nominal = base_ms as f64 * 2f64.powi(attempt as i32 - 1) / 1000.0;
        let delay = policy.backoff(attempt).as_secs_f64();
        prop_assert!(delay >= nominal * 0.75 - 1e-6, "{delay} < {nominal} * 0.75");
        prop_assert!(delay <= nominal * 1.25 + 1e-6, "{delay} > {nominal} * 1.25");
    }

    #[test]
    fn suggested_seconds_are_parsed(seconds in 1u64..3_600) {
        let message = format!("429 Too Many Requests. Please retry after {seconds} seconds");
        prop_assert_eq!(FailureClass::classify(&message), FailureClass::RateLimited);
        prop_assert_eq!(server_delay(&message), Some(Duration::from_secs(seconds)));
    }

    #[test]
    fn messages_without_markers_are_fatal(message in "[a-h ]{0,60}") {
        prop_assert_eq!(FailureClass::classify(&message), FailureClass::Fatal);
    }
}
