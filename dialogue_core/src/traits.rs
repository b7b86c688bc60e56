//! Core traits for the conversation workspace

use async_trait::async_trait;
use errors::{BackendError, ModelError};

use crate::types::{CacheCategory, ConversationKey, DialogueState, Exchange, HistoryEntry, RetentionPolicy};

/// Persistence backend for conversation records.
///
/// Implementations report failures as [`BackendError`] with an explicit
/// kind; the conversation store decides from the kind whether to degrade to
/// its local fallback.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Raw stored state, if any. Validation is left to the caller.
    async fn load_state(&self, key: &ConversationKey) -> Result<Option<String>, BackendError>;

    async fn store_state(
        &self,
        key: &ConversationKey,
        state: DialogueState,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError>;

    /// History newest first, the order in which entries are pushed.
    async fn load_history(&self, key: &ConversationKey) -> Result<Vec<HistoryEntry>, BackendError>;

    /// Appends both entries, trims to `policy.max_entries` and refreshes the
    /// expiration as one atomic unit.
    async fn append_exchange(
        &self,
        key: &ConversationKey,
        exchange: &Exchange,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError>;

    /// Removes every conversation record. Returns the number of removed keys.
    async fn clear_all(&self) -> Result<usize, BackendError>;
}

/// External classification model. Errors carry the provider's raw text so
/// the retry layer can classify them.
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    async fn classify(&self, input: &str, category: CacheCategory) -> Result<String, ModelError>;
}
