//! Classification of remote failures from their error text.
//!
//! Providers surface rate limits and outages as opaque messages, so the
//! class is inferred from well-known markers.

use errors::CallError;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource_exhausted",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "internal error",
    "internal server error",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "overloaded",
    "timed out",
    "connection reset",
];

static RATE_LIMIT_STATUS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b429\b").ok());

static TRANSIENT_STATUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b50[0234]\b").ok());

/// Server-suggested waits, in the formats providers are known to use.
/// Group 1 is the amount, group 2 the optional unit.
static SERVER_DELAY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)retry_?delay["']?\s*[:{]\s*(?:seconds:\s*)?["']?(\d+(?:\.\d+)?)\s*(ms|s)?"#,
        r"(?i)(?:retry|try again)\s+(?:after|in)\s+(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)?\b",
        r"(?i)\bwait\s+(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Transient,
    Fatal,
}

impl FailureClass {
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();

        if matches_status(&RATE_LIMIT_STATUS, &lowered) || contains_any(&lowered, RATE_LIMIT_MARKERS) {
            FailureClass::RateLimited
        } else if matches_status(&TRANSIENT_STATUS, &lowered)
            || contains_any(&lowered, TRANSIENT_MARKERS)
        {
            FailureClass::Transient
        } else {
            FailureClass::Fatal
        }
    }

    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::RateLimited => "rate_limited",
            FailureClass::Transient => "transient",
            FailureClass::Fatal => "fatal",
        }
    }

    pub fn into_error(self, reason: String) -> CallError {
        match self {
            FailureClass::RateLimited => CallError::RateLimited { reason },
            FailureClass::Transient => CallError::Transient { reason },
            FailureClass::Fatal => CallError::Fatal { reason },
        }
    }
}

/// Longest server-suggested wait a single retry honours.
pub const MAX_SERVER_DELAY: Duration = Duration::from_secs(300);

/// Wait time embedded in a rate-limit message, if any.
pub fn server_delay(message: &str) -> Option<Duration> {
    SERVER_DELAY_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(message)?;
        let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
        let millis = captures
            .get(2)
            .is_some_and(|unit| unit.as_str().to_lowercase().starts_with("m"));
        let seconds = if millis { amount / 1000.0 } else { amount };
        Duration::try_from_secs_f64(seconds).ok()
    })
}

fn matches_status(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|regex| regex.is_match(text))
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_markers() {
        for message in [
            "429 Too Many Requests",
            "Rate limit reached for model",
            "Quota exceeded for project",
            "RESOURCE_EXHAUSTED: try later",
        ] {
            assert_eq!(FailureClass::classify(message), FailureClass::RateLimited, "{message}");
        }
    }

    #[test]
    fn test_transient_markers() {
        for message in [
            "503 Service Unavailable",
            "upstream returned 502",
            "The model is overloaded",
            "request timed out",
            "Connection reset by peer",
        ] {
            assert_eq!(FailureClass::classify(message), FailureClass::Transient, "{message}");
        }
    }

    #[test]
    fn test_everything_else_is_fatal() {
        for message in ["400 Bad Request", "invalid api key", "used 5000 tokens"] {
            assert_eq!(FailureClass::classify(message), FailureClass::Fatal, "{message}");
        }
    }

    #[test]
    fn test_rate_limit_wins_over_transient() {
        assert_eq!(
            FailureClass::classify("500 internal error: quota exceeded"),
            FailureClass::RateLimited
        );
    }

    #[test]
    fn test_server_delay_formats() {
        assert_eq!(server_delay("429: retry after 7"), Some(Duration::from_secs(7)));
        assert_eq!(
            server_delay("Too many requests, retry in 1.5s"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            server_delay(r#"{"retryDelay": "12s"}"#),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            server_delay("quota exceeded retry_delay { seconds: 30 }"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            server_delay("rate limited, retry after 250ms"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(server_delay("please wait 3 seconds"), Some(Duration::from_secs(3)));
        assert_eq!(server_delay("429 Too Many Requests"), None);
    }
}
