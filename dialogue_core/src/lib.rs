//! # Dialogue Core
//!
//! Shared types and traits used across the conversation workspace.

pub mod traits;
pub mod types;

pub use traits::{ClassificationModel, ConversationBackend};
pub use types::{
    CacheCategory, ConversationKey, DialogueState, Exchange, HistoryEntry, RetentionPolicy, Role,
};
