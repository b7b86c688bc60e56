//! # Assistant Core
//!
//! Composition root for the conversation workspace. [`AssistantCore`] owns
//! the conversation store, the classification pipeline and the shared retry
//! caller, and exposes them behind one facade keyed by raw conversation ids.
//!
//! Raw ids are trimmed before use. An empty id never reaches the store:
//! reads answer with defaults and writes are ignored.

use classifier::{CacheEfficiency, Classification, ClassificationSource, Classifier, policy};
use config::CoreConfig;
use conversation::{ClearReport, ConversationStats, ConversationStore};
use dialogue_core::{CacheCategory, ClassificationModel, ConversationBackend, ConversationKey, DialogueState};
use errors::{CallError, ConfigError};
use resilience::{CircuitState, ResilientCaller, RetryPolicy, RetryStats};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storage::RedisConversationBackend;

const TOP_HOT_INPUTS: usize = 10;

/// Classification and retry figures in one report.
#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyReport {
    pub cache: CacheEfficiency,
    pub retries: RetryStats,
    pub circuit: CircuitState,
    pub top_hot_inputs: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearAllReport {
    #[serde(flatten)]
    pub conversations: ClearReport,
    pub cache_cleared: bool,
}

pub struct AssistantCore {
    config: CoreConfig,
    store: ConversationStore,
    classifier: Classifier,
    caller: Arc<ResilientCaller>,
}

impl AssistantCore {
    /// Validates `config` and connects to Redis when enabled.
    ///
    /// An unreachable Redis is not fatal: the core starts on local memory
    /// alone and logs a warning.
    pub async fn connect(config: CoreConfig) -> Result<Self, ConfigError> {
        Self::connect_with_model(config, None).await
    }

    pub async fn connect_with_model(
        config: CoreConfig,
        model: Option<Arc<dyn ClassificationModel>>,
    ) -> Result<Self, ConfigError> {
        config::validate(&config)?;

        let remote: Option<Arc<dyn ConversationBackend>> = if config.redis.enabled {
            match RedisConversationBackend::connect(
                &config.redis.connection_url(),
                config.redis.connect_timeout(),
            )
            .await
            {
                Ok(backend) => Some(Arc::new(backend) as Arc<dyn ConversationBackend>),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable, using local conversation memory only");
                    None
                }
            }
        } else {
            tracing::info!("Redis disabled, using local conversation memory only");
            None
        };

        Ok(Self::with_backends(config, remote, model))
    }

    /// Builds the core from ready-made backends without any I/O.
    pub fn with_backends(
        config: CoreConfig,
        remote: Option<Arc<dyn ConversationBackend>>,
        model: Option<Arc<dyn ClassificationModel>>,
    ) -> Self {
        let caller = Arc::new(ResilientCaller::new(RetryPolicy::from_config(&config.resilience)));
        let store = ConversationStore::new(&config.conversation, remote);
        let classifier = Classifier::new(&config, model, caller.clone());

        tracing::info!(
            remote = store.has_remote(),
            window_size = config.conversation.window_size,
            lock_timeout_ms = config.conversation.lock_timeout_ms,
            "Assistant core initialized"
        );

        Self {
            config,
            store,
            classifier,
            caller,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub async fn get_dialogue_state(&self, key: &str) -> DialogueState {
        match ConversationKey::parse(key) {
            Some(key) => self.store.get_state(&key).await,
            None => DialogueState::default(),
        }
    }

    pub async fn set_dialogue_state(&self, key: &str, state: &str) {
        if let Some(key) = ConversationKey::parse(key) {
            self.store.set_state(&key, state).await;
        }
    }

    /// History lines, oldest first, e.g. `"Пользователь: Hi"`.
    pub async fn get_history(&self, key: &str) -> Vec<String> {
        let Some(key) = ConversationKey::parse(key) else {
            return Vec::new();
        };
        self.store
            .get_history(&key)
            .await
            .iter()
            .map(|entry| entry.to_line())
            .collect()
    }

    pub async fn append_exchange(&self, key: &str, user_text: &str, assistant_text: &str) {
        if let Some(key) = ConversationKey::parse(key) {
            self.store.append_exchange(&key, user_text, assistant_text).await;
        }
    }

    pub async fn advance_dialogue_state(&self, key: &str, message: &str) -> DialogueState {
        match ConversationKey::parse(key) {
            Some(key) => self.store.advance_state(&key, message).await,
            None => DialogueState::default(),
        }
    }

    pub async fn classify(&self, key: &str, input: &str, category: CacheCategory) -> Classification {
        match ConversationKey::parse(key) {
            Some(key) => self.classifier.classify(&key, input, category).await,
            None => Classification::new(policy(category).fallback, ClassificationSource::Fallback),
        }
    }

    pub fn should_avoid_humor(&self, text: &str) -> bool {
        self.classifier.should_avoid_humor(text)
    }

    /// Runs `f` through the shared retry loop with a call-specific attempt
    /// budget and base delay.
    pub async fn resilient_call<T, E, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        base_delay: Duration,
        f: F,
    ) -> Result<T, CallError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = self.caller.policy().with_attempts(max_attempts, base_delay);
        self.caller.call_with(operation, policy, f).await
    }

    pub async fn clear_all(&self) -> ClearAllReport {
        let conversations = self.store.clear_all().await;
        self.classifier.clear();
        tracing::info!(
            remote_removed = ?conversations.remote_removed,
            local_removed = conversations.local_removed,
            locks_released = conversations.locks_released,
            "Cleared all conversations and the classification cache"
        );
        ClearAllReport {
            conversations,
            cache_cleared: true,
        }
    }

    pub async fn stats(&self, key: &str) -> Option<ConversationStats> {
        let key = ConversationKey::parse(key)?;
        Some(self.store.stats(&key).await)
    }

    pub fn efficiency_stats(&self) -> EfficiencyReport {
        EfficiencyReport {
            cache: self.classifier.efficiency_stats(),
            retries: self.caller.stats(),
            circuit: self.classifier.circuit_state(),
            top_hot_inputs: self.classifier.top_patterns(TOP_HOT_INPUTS),
        }
    }

    /// Drops expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.classifier.purge_expired()
    }

    pub fn shutdown(self) {
        let efficiency = self.efficiency_stats();
        let counters = self.store.counters();
        tracing::info!(
            reads = counters.reads,
            writes = counters.writes,
            lock_timeouts = counters.lock_timeouts,
            dropped_writes = counters.dropped_writes,
            fallback_uses = counters.fallback_uses,
            cache_requests = efficiency.cache.total_requests,
            cache_miss_rate = efficiency.cache.miss_rate,
            total_retries = efficiency.retries.total_retries,
            exhausted_operations = efficiency.retries.exhausted_operations,
            "Assistant core shut down"
        );
    }
}
