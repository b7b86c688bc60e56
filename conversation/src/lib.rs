//! # Conversation
//!
//! Concurrency-safe dialogue state and history per conversation key.
//!
//! - [`lock`]: time-bounded mutual exclusion and reader/writer locks
//! - [`registry`]: one lock per key, bounded with idle eviction
//! - [`store`]: the store itself, remote first with a local fallback
//! - [`analyzer`]: keyword rules for dialogue state transitions

pub mod analyzer;
pub mod lock;
pub mod registry;
pub mod sanitize;
pub mod store;
pub mod telemetry;

pub use analyzer::StateAnalyzer;
pub use lock::{BoundedLock, ReadGuard, SharedStateLock, WriteGuard};
pub use registry::KeyedLockRegistry;
pub use sanitize::sanitize_reply;
pub use store::{ClearReport, ConversationStats, ConversationStore};
pub use telemetry::{ConversationTelemetry, StoreCounters};
