//! # Conversation Core Errors
//!
//! Error types shared by the conversation workspace.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields everywhere so log lines stay self-describing
//! - Backend errors carry an explicit kind instead of relying on the caller
//!   to pattern-match on message text

use thiserror::Error;

/// Why a backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection refused, dropped or timed out.
    Unavailable,
    /// The backend answered but rejected the command.
    Command,
    /// Stored data could not be decoded.
    Corrupt,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendErrorKind::Unavailable => write!(f, "unavailable"),
            BackendErrorKind::Command => write!(f, "command_failed"),
            BackendErrorKind::Corrupt => write!(f, "corrupt_data"),
        }
    }
}

/// Storage backend errors
#[derive(Debug, Error)]
#[error("{backend} {kind}: {reason}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub backend: String,
    pub reason: String,
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Unavailable,
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn command(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Command,
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Corrupt,
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.kind == BackendErrorKind::Unavailable
    }
}

/// Lock acquisition errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Timed out after {timeout_ms}ms acquiring {mode} lock for {key}")]
    Timeout {
        key: String,
        mode: &'static str,
        timeout_ms: u64,
    },
}

/// Remote call errors, as surfaced to callers of the classification path
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Rate limited: {reason}")]
    RateLimited { reason: String },

    #[error("Transient remote failure: {reason}")]
    Transient { reason: String },

    #[error("Remote call failed: {reason}")]
    Fatal { reason: String },

    #[error("Circuit open: retry in {retry_in_ms}ms")]
    CircuitOpen { retry_in_ms: u64 },
}

impl CallError {
    /// Rate limits and transient failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::RateLimited { .. } | CallError::Transient { .. })
    }
}

/// Opaque error raised by an external model provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ModelError {
    pub message: String,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidEnv { key: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    File { path: String, reason: String },

    #[error("Failed to parse {format} config: {reason}")]
    Parse { format: String, reason: String },

    #[error("Unsupported config file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Configuration validation failed: {reason}")]
    Validation { reason: String },
}
