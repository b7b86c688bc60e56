//! In-process conversation memory used when Redis is unreachable.
//!
//! A single mutex guards the whole map. Per-key serialization happens one
//! layer up in the conversation store.

use async_trait::async_trait;
use dialogue_core::{
    ConversationBackend, ConversationKey, DialogueState, Exchange, HistoryEntry, RetentionPolicy,
};
use errors::BackendError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const BACKEND: &str = "local";

#[derive(Debug)]
struct LocalRecord {
    state: Option<DialogueState>,
    /// Chronological order, oldest first.
    history: VecDeque<HistoryEntry>,
    touched_at: Instant,
    ttl: Duration,
}

impl LocalRecord {
    fn new(ttl: Duration) -> Self {
        Self {
            state: None,
            history: VecDeque::new(),
            touched_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.touched_at) >= self.ttl
    }

    fn touch(&mut self, ttl: Duration) {
        self.touched_at = Instant::now();
        self.ttl = ttl;
    }
}

pub struct LocalConversationMemory {
    records: Mutex<HashMap<String, LocalRecord>>,
    max_users: usize,
    idle_threshold: Duration,
}

impl LocalConversationMemory {
    pub fn new(max_users: usize, idle_threshold: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_users: max_users.max(2),
            idle_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains(&self, key: &ConversationKey) -> bool {
        let now = Instant::now();
        self.records
            .lock()
            .get(key.as_str())
            .is_some_and(|record| !record.is_expired(now))
    }

    pub fn clear(&self) -> usize {
        let mut records = self.records.lock();
        let removed = records.len();
        records.clear();
        removed
    }

    /// Evicts half of the records once the population exceeds `max_users`.
    ///
    /// Expired records go first, then records idle longer than the idle
    /// threshold, then the least recently touched.
    fn sweep(&self, records: &mut HashMap<String, LocalRecord>) {
        if records.len() <= self.max_users {
            return;
        }

        let now = Instant::now();
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));

        let target = before / 2;
        let already = before - records.len();
        if already < target {
            let mut candidates: Vec<(bool, Instant, String)> = records
                .iter()
                .map(|(key, record)| {
                    let active = now.duration_since(record.touched_at) < self.idle_threshold;
                    (active, record.touched_at, key.clone())
                })
                .collect();
            // Idle records (active = false) sort first, oldest first within each group.
            candidates.sort();
            for (_, _, key) in candidates.into_iter().take(target - already) {
                records.remove(&key);
            }
        }

        tracing::info!(
            backend = BACKEND,
            evicted = before - records.len(),
            remaining = records.len(),
            "Swept local conversation memory"
        );
    }

    fn with_live_record<T>(
        &self,
        key: &ConversationKey,
        read: impl FnOnce(&LocalRecord) -> T,
    ) -> Option<T> {
        let mut records = self.records.lock();
        let now = Instant::now();
        let expired = records.get(key.as_str())?.is_expired(now);
        if expired {
            records.remove(key.as_str());
            return None;
        }
        records.get(key.as_str()).map(read)
    }

    fn with_record_mut(
        &self,
        key: &ConversationKey,
        policy: &RetentionPolicy,
        write: impl FnOnce(&mut LocalRecord),
    ) {
        let mut records = self.records.lock();
        let now = Instant::now();
        let record = records
            .entry(key.as_str().to_string())
            .or_insert_with(|| LocalRecord::new(policy.ttl));
        if record.is_expired(now) {
            *record = LocalRecord::new(policy.ttl);
        }
        write(record);
        record.touch(policy.ttl);

        self.sweep(&mut records);
    }
}

#[async_trait]
impl ConversationBackend for LocalConversationMemory {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn load_state(&self, key: &ConversationKey) -> Result<Option<String>, BackendError> {
        Ok(self
            .with_live_record(key, |record| record.state.map(|s| s.to_string()))
            .flatten())
    }

    async fn store_state(
        &self,
        key: &ConversationKey,
        state: DialogueState,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError> {
        self.with_record_mut(key, policy, |record| record.state = Some(state));
        Ok(())
    }

    async fn load_history(&self, key: &ConversationKey) -> Result<Vec<HistoryEntry>, BackendError> {
        Ok(self
            .with_live_record(key, |record| record.history.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_exchange(
        &self,
        key: &ConversationKey,
        exchange: &Exchange,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError> {
        let limit = policy.entry_limit();
        self.with_record_mut(key, policy, |record| {
            record.history.push_back(exchange.user.clone());
            record.history.push_back(exchange.assistant.clone());
            while record.history.len() > limit {
                record.history.pop_front();
            }
        });
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, BackendError> {
        Ok(self.clear())
    }
}
