//! # Storage Layer
//!
//! Conversation persistence backends: Redis as the primary store and an
//! in-process map as the degraded fallback.

pub mod local;
pub mod redis;

pub use local::LocalConversationMemory;
pub use self::redis::RedisConversationBackend;
