//! # Conversation Store
//!
//! Per-key dialogue state and bounded history on top of a remote backend,
//! with an in-process fallback.
//!
//! Every operation runs under the key's [`SharedStateLock`]: reads share it,
//! writes hold it exclusively. Lock timeouts never surface to callers:
//! a state read yields the initial state, a history read yields nothing and
//! a write is dropped. All three are counted.
//!
//! A remote error moves only the failing call to local memory. The next
//! call tries the remote backend again.

use crate::analyzer::StateAnalyzer;
use crate::registry::KeyedLockRegistry;
use crate::sanitize::sanitize_reply;
use crate::telemetry::{ConversationTelemetry, StoreCounters};
use config::ConversationConfig;
use dialogue_core::{
    ConversationBackend, ConversationKey, DialogueState, Exchange, HistoryEntry, RetentionPolicy,
};
use errors::{BackendError, BackendErrorKind, LockError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use storage::LocalConversationMemory;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub key: String,
    pub current_state: DialogueState,
    pub message_count: usize,
    pub recent_messages: Vec<String>,
    pub remote_available: bool,
    pub local_records: usize,
    pub lock_entries: usize,
    pub counters: StoreCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    /// `None` when no remote backend is configured or the remote clear failed.
    pub remote_removed: Option<usize>,
    pub local_removed: usize,
    pub locks_released: usize,
}

pub struct ConversationStore {
    remote: Option<Arc<dyn ConversationBackend>>,
    remote_healthy: AtomicBool,
    local: LocalConversationMemory,
    locks: KeyedLockRegistry,
    analyzer: StateAnalyzer,
    telemetry: ConversationTelemetry,
    policy: RetentionPolicy,
    lock_timeout: Duration,
    recent_entries: usize,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig, remote: Option<Arc<dyn ConversationBackend>>) -> Self {
        let remote_healthy = AtomicBool::new(remote.is_some());
        Self {
            remote,
            remote_healthy,
            local: LocalConversationMemory::new(config.max_fallback_users, config.fallback_idle()),
            locks: KeyedLockRegistry::new(config.lock_registry_capacity),
            analyzer: StateAnalyzer::new(),
            telemetry: ConversationTelemetry::new(),
            policy: RetentionPolicy::from_window(config.window_size, config.expiration()),
            lock_timeout: config.lock_timeout(),
            recent_entries: config.stats_recent_entries,
        }
    }

    /// Store with no remote backend, serving everything from local memory.
    pub fn local_only(config: &ConversationConfig) -> Self {
        Self::new(config, None)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Whether the last remote call succeeded.
    pub fn remote_available(&self) -> bool {
        self.remote.is_some() && self.remote_healthy.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn counters(&self) -> StoreCounters {
        self.telemetry.snapshot()
    }

    pub fn lock_registry(&self) -> &KeyedLockRegistry {
        &self.locks
    }

    pub fn local_memory(&self) -> &LocalConversationMemory {
        &self.local
    }

    pub async fn get_state(&self, key: &ConversationKey) -> DialogueState {
        let lock = self.locks.get_lock(key.as_str());
        let _guard = match lock.read(self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                self.on_lock_timeout("get_state", &e);
                return DialogueState::default();
            }
        };

        self.current_state(key).await
    }

    /// Stores `state` if it names a known dialogue state. Anything else is
    /// ignored.
    pub async fn set_state(&self, key: &ConversationKey, state: &str) {
        let Some(state) = DialogueState::parse(state) else {
            debug!(key = %key, state, "Ignoring unknown dialogue state");
            return;
        };

        let lock = self.locks.get_lock(key.as_str());
        let _guard = match lock.write(self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                self.on_lock_timeout("set_state", &e);
                self.telemetry.record_dropped_write("set_state");
                return;
            }
        };

        self.write_state("set_state", key, state).await;
    }

    /// History in chronological order, oldest first.
    pub async fn get_history(&self, key: &ConversationKey) -> Vec<HistoryEntry> {
        let lock = self.locks.get_lock(key.as_str());
        let _guard = match lock.read(self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                self.on_lock_timeout("get_history", &e);
                return Vec::new();
            }
        };

        self.chronological_history("get_history", key).await
    }

    /// Appends the user message and the reply as one unit. An empty user
    /// message is ignored.
    pub async fn append_exchange(&self, key: &ConversationKey, user_text: &str, assistant_text: &str) {
        if user_text.trim().is_empty() {
            debug!(key = %key, "Ignoring exchange without a user message");
            return;
        }
        let exchange = Exchange::new(user_text, sanitize_reply(assistant_text));

        let lock = self.locks.get_lock(key.as_str());
        let _guard = match lock.write(self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                self.on_lock_timeout("append_exchange", &e);
                self.telemetry.record_dropped_write("append_exchange");
                return;
            }
        };

        self.write_exchange(key, &exchange).await;
    }

    /// Reads the current state, applies the transition rules to `message`
    /// and stores the result, all under one write lock.
    pub async fn advance_state(&self, key: &ConversationKey, message: &str) -> DialogueState {
        let lock = self.locks.get_lock(key.as_str());
        let _guard = match lock.write(self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                self.on_lock_timeout("advance_state", &e);
                self.telemetry.record_dropped_write("advance_state");
                return DialogueState::default();
            }
        };

        let current = self.current_state(key).await;
        let next = self.analyzer.analyze_transition(message, current);
        if next != current {
            info!(key = %key, from = %current, to = %next, "Dialogue state changed");
        }
        self.write_state("advance_state", key, next).await;
        next
    }

    pub async fn stats(&self, key: &ConversationKey) -> ConversationStats {
        let history = self.get_history(key).await;
        let current_state = self.get_state(key).await;

        let skip = history.len().saturating_sub(self.recent_entries);
        let recent_messages = history[skip..].iter().map(HistoryEntry::to_line).collect();

        let local_records = self.local.len();
        let lock_entries = self.locks.len();
        self.telemetry.record_population(local_records, lock_entries);

        ConversationStats {
            key: key.to_string(),
            current_state,
            message_count: history.len(),
            recent_messages,
            remote_available: self.remote_available(),
            local_records,
            lock_entries,
            counters: self.telemetry.snapshot(),
        }
    }

    /// Removes every record from both backends and drops unused locks.
    pub async fn clear_all(&self) -> ClearReport {
        let remote_removed = match &self.remote {
            Some(remote) => match remote.clear_all().await {
                Ok(removed) => {
                    self.mark_remote_healthy();
                    Some(removed)
                }
                Err(e) => {
                    self.telemetry.record_remote_error("clear_all", e.kind.to_string());
                    self.mark_remote_failure(&e);
                    error!(error = %e, "Failed to clear remote conversation records");
                    None
                }
            },
            None => None,
        };

        let report = ClearReport {
            remote_removed,
            local_removed: self.local.clear(),
            locks_released: self.locks.clear(),
        };
        info!(
            remote_removed = ?report.remote_removed,
            local_removed = report.local_removed,
            locks_released = report.locks_released,
            "Cleared all conversations"
        );
        report
    }

    /// State for a key whose lock the caller already holds.
    async fn current_state(&self, key: &ConversationKey) -> DialogueState {
        match self.read_state(key).await {
            Some(raw) => DialogueState::parse(&raw).unwrap_or_else(|| {
                warn!(key = %key, stored = %raw, "Unknown stored dialogue state, resetting");
                DialogueState::default()
            }),
            None => {
                let history = self.chronological_history("get_state", key).await;
                self.analyzer.infer_from_history(&history)
            }
        }
    }

    async fn read_state(&self, key: &ConversationKey) -> Option<String> {
        if let Some(remote) = &self.remote {
            match remote.load_state(key).await {
                Ok(value) => {
                    self.mark_remote_healthy();
                    self.telemetry.record_read("get_state", remote.name());
                    return value;
                }
                Err(e) => {
                    if !self.fall_back("get_state", key, &e) {
                        return None;
                    }
                }
            }
        }

        match self.local.load_state(key).await {
            Ok(value) => {
                self.telemetry.record_read("get_state", self.local.name());
                value
            }
            Err(e) => {
                error!(key = %key, error = %e, "Local state read failed");
                None
            }
        }
    }

    async fn chronological_history(
        &self,
        operation: &'static str,
        key: &ConversationKey,
    ) -> Vec<HistoryEntry> {
        let mut history = self.read_history(operation, key).await;
        history.reverse();
        history
    }

    /// Newest first, as stored.
    async fn read_history(&self, operation: &'static str, key: &ConversationKey) -> Vec<HistoryEntry> {
        if let Some(remote) = &self.remote {
            match remote.load_history(key).await {
                Ok(history) => {
                    self.mark_remote_healthy();
                    self.telemetry.record_read(operation, remote.name());
                    return history;
                }
                Err(e) => {
                    if !self.fall_back(operation, key, &e) {
                        return Vec::new();
                    }
                }
            }
        }

        match self.local.load_history(key).await {
            Ok(history) => {
                self.telemetry.record_read(operation, self.local.name());
                history
            }
            Err(e) => {
                error!(key = %key, error = %e, "Local history read failed");
                Vec::new()
            }
        }
    }

    async fn write_state(&self, operation: &'static str, key: &ConversationKey, state: DialogueState) {
        if let Some(remote) = &self.remote {
            match remote.store_state(key, state, &self.policy).await {
                Ok(()) => {
                    self.mark_remote_healthy();
                    self.telemetry.record_write(operation, remote.name());
                    return;
                }
                Err(e) => {
                    if !self.fall_back(operation, key, &e) {
                        self.telemetry.record_dropped_write(operation);
                        return;
                    }
                }
            }
        }

        match self.local.store_state(key, state, &self.policy).await {
            Ok(()) => self.telemetry.record_write(operation, self.local.name()),
            Err(e) => {
                error!(key = %key, error = %e, "Local state write failed");
                self.telemetry.record_dropped_write(operation);
            }
        }
    }

    async fn write_exchange(&self, key: &ConversationKey, exchange: &Exchange) {
        const OPERATION: &str = "append_exchange";

        if let Some(remote) = &self.remote {
            match remote.append_exchange(key, exchange, &self.policy).await {
                Ok(()) => {
                    self.mark_remote_healthy();
                    self.telemetry.record_write(OPERATION, remote.name());
                    return;
                }
                Err(e) => {
                    if !self.fall_back(OPERATION, key, &e) {
                        self.telemetry.record_dropped_write(OPERATION);
                        return;
                    }
                }
            }
        }

        match self.local.append_exchange(key, exchange, &self.policy).await {
            Ok(()) => self.telemetry.record_write(OPERATION, self.local.name()),
            Err(e) => {
                error!(key = %key, error = %e, "Local history write failed");
                self.telemetry.record_dropped_write(OPERATION);
            }
        }
    }

    /// Records a remote failure and decides whether this call moves to
    /// local memory. Undecodable data is treated as absent instead.
    fn fall_back(&self, operation: &'static str, key: &ConversationKey, error: &BackendError) -> bool {
        self.telemetry.record_remote_error(operation, error.kind.to_string());
        self.mark_remote_failure(error);

        match error.kind {
            BackendErrorKind::Unavailable | BackendErrorKind::Command => {
                warn!(
                    operation,
                    key = %key,
                    error = %error,
                    "Remote conversation backend failed, using local memory for this call"
                );
                self.telemetry.record_fallback(operation);
                true
            }
            BackendErrorKind::Corrupt => {
                error!(operation, key = %key, error = %error, "Unreadable conversation record");
                false
            }
        }
    }

    fn mark_remote_healthy(&self) {
        if !self.remote_healthy.swap(true, Ordering::Relaxed) {
            info!("Remote conversation backend reachable again");
        }
    }

    fn mark_remote_failure(&self, error: &BackendError) {
        if error.is_unavailable() {
            self.remote_healthy.store(false, Ordering::Relaxed);
        }
    }

    fn on_lock_timeout(&self, operation: &'static str, error: &LockError) {
        let LockError::Timeout { mode, .. } = error;
        self.telemetry.record_lock_timeout(operation, *mode);
        warn!(operation, error = %error, "Conversation lock timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn key(raw: &str) -> ConversationKey {
        ConversationKey::parse(raw).unwrap()
    }

    fn config() -> ConversationConfig {
        ConversationConfig {
            window_size: 3,
            lock_timeout_ms: 100,
            ..ConversationConfig::default()
        }
    }

    /// Remote backend that fails every call with a fixed kind.
    struct FailingBackend {
        kind: BackendErrorKind,
        calls: AtomicUsize,
    }

    impl FailingBackend {
        fn new(kind: BackendErrorKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
            })
        }

        fn fail<T>(&self) -> Result<T, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError {
                kind: self.kind,
                backend: "failing".to_string(),
                reason: "scripted failure".to_string(),
            })
        }
    }

    #[async_trait]
    impl ConversationBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn load_state(&self, _key: &ConversationKey) -> Result<Option<String>, BackendError> {
            self.fail()
        }

        async fn store_state(
            &self,
            _key: &ConversationKey,
            _state: DialogueState,
            _policy: &RetentionPolicy,
        ) -> Result<(), BackendError> {
            self.fail()
        }

        async fn load_history(&self, _key: &ConversationKey) -> Result<Vec<HistoryEntry>, BackendError> {
            self.fail()
        }

        async fn append_exchange(
            &self,
            _key: &ConversationKey,
            _exchange: &Exchange,
            _policy: &RetentionPolicy,
        ) -> Result<(), BackendError> {
            self.fail()
        }

        async fn clear_all(&self) -> Result<usize, BackendError> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn test_append_then_history_is_chronological() {
        let store = ConversationStore::local_only(&config());
        store.append_exchange(&key("u1"), "Hi", "Hello!").await;

        let lines: Vec<String> = store
            .get_history(&key("u1"))
            .await
            .iter()
            .map(HistoryEntry::to_line)
            .collect();
        assert_eq!(lines, vec!["Пользователь: Hi", "Ассистент: Hello!"]);
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_window() {
        let store = ConversationStore::local_only(&config());
        for i in 0..5 {
            store
                .append_exchange(&key("u1"), &format!("q{i}"), &format!("a{i}"))
                .await;
        }
        let history = store.get_history(&key("u1")).await;
        assert_eq!(history.len(), 6);
        assert_eq!(history[0], HistoryEntry::user("q2"));
        assert_eq!(history[5], HistoryEntry::assistant("a4"));
    }

    #[tokio::test]
    async fn test_reply_markers_are_replaced() {
        let store = ConversationStore::local_only(&config());
        store
            .append_exchange(&key("u1"), "Хочу урок", "Держите [ACTION:SEND_LESSON_LINK]")
            .await;
        let history = store.get_history(&key("u1")).await;
        assert_eq!(history[1].text, "Держите [ССЫЛКА_НА_УРОК]");
    }

    #[tokio::test]
    async fn test_empty_user_message_is_ignored() {
        let store = ConversationStore::local_only(&config());
        store.append_exchange(&key("u1"), "  ", "reply").await;
        assert!(store.get_history(&key("u1")).await.is_empty());
        assert_eq!(store.counters().writes, 0);
    }

    #[tokio::test]
    async fn test_state_defaults_and_round_trips() {
        let store = ConversationStore::local_only(&config());
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Greeting);

        store.set_state(&key("u1"), "closing").await;
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Closing);

        store.set_state(&key("u1"), "dancing").await;
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Closing);
    }

    #[tokio::test]
    async fn test_missing_state_is_inferred_from_history() {
        let store = ConversationStore::local_only(&config());
        store
            .append_exchange(&key("u1"), "Сколько стоит курс?", "Зависит от группы")
            .await;
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::FactFinding);
    }

    #[tokio::test]
    async fn test_advance_state_persists_transition() {
        let store = ConversationStore::local_only(&config());
        let next = store.advance_state(&key("u1"), "Хочу записаться на пробный").await;
        assert_eq!(next, DialogueState::Closing);
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Closing);
    }

    #[tokio::test]
    async fn test_unavailable_remote_falls_back_per_call() {
        let remote = FailingBackend::new(BackendErrorKind::Unavailable);
        let store = ConversationStore::new(&config(), Some(remote.clone()));
        assert!(store.remote_available());

        store.append_exchange(&key("u1"), "Hi", "Hello!").await;
        assert!(!store.remote_available());

        let history = store.get_history(&key("u1")).await;
        assert_eq!(history.len(), 2);

        // Each call retried the remote backend before falling back.
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        let counters = store.counters();
        assert_eq!(counters.fallback_uses, 2);
        assert_eq!(counters.remote_errors, 2);
        assert_eq!(counters.writes, 1);
    }

    #[tokio::test]
    async fn test_corrupt_remote_data_reads_as_absent() {
        let remote = FailingBackend::new(BackendErrorKind::Corrupt);
        let store = ConversationStore::new(&config(), Some(remote));

        assert!(store.get_history(&key("u1")).await.is_empty());
        let counters = store.counters();
        assert_eq!(counters.fallback_uses, 0);
        assert_eq!(counters.remote_errors, 1);
        assert!(store.remote_available());
    }

    #[tokio::test]
    async fn test_lock_timeout_degrades_and_is_counted() {
        let store = ConversationStore::local_only(&config());
        store.set_state(&key("u1"), "closing").await;

        let lock = store.lock_registry().get_lock("u1");
        let held = lock.write(Duration::from_millis(100)).await.unwrap();

        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Greeting);
        assert!(store.get_history(&key("u1")).await.is_empty());
        store.append_exchange(&key("u1"), "Hi", "Hello!").await;

        let counters = store.counters();
        assert_eq!(counters.lock_timeouts, 3);
        assert_eq!(counters.dropped_writes, 1);

        drop(held);
        assert_eq!(store.get_state(&key("u1")).await, DialogueState::Closing);
        assert!(store.get_history(&key("u1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_stats_reports_recent_entries() {
        let store = ConversationStore::local_only(&config());
        for i in 0..3 {
            store
                .append_exchange(&key("u1"), &format!("q{i}"), &format!("a{i}"))
                .await;
        }

        let stats = store.stats(&key("u1")).await;
        assert_eq!(stats.key, "u1");
        assert_eq!(stats.message_count, 6);
        assert_eq!(
            stats.recent_messages,
            vec![
                "Пользователь: q1",
                "Ассистент: a1",
                "Пользователь: q2",
                "Ассистент: a2"
            ]
        );
        assert!(!stats.remote_available);
        assert_eq!(stats.local_records, 1);
        assert_eq!(stats.counters.writes, 3);
    }

    #[tokio::test]
    async fn test_clear_all_empties_local_memory() {
        let store = ConversationStore::local_only(&config());
        store.append_exchange(&key("u1"), "Hi", "Hello!").await;
        store.append_exchange(&key("u2"), "Hi", "Hello!").await;

        let report = store.clear_all().await;
        assert_eq!(report.remote_removed, None);
        assert_eq!(report.local_removed, 2);
        assert!(store.get_history(&key("u1")).await.is_empty());
        assert!(store.lock_registry().len() <= 1);
    }
}
