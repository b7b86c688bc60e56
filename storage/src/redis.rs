//! Redis-backed conversation records.
//!
//! Key layout, each with a sliding expiration refreshed on every write:
//! - `history:<key>`: list of `"<role>: <text>"` lines, newest first
//! - `state:<key>`: dialogue state string
//! - `metadata:<key>`: hash with `last_activity` and `message_count`

use async_trait::async_trait;
use dialogue_core::{
    ConversationBackend, ConversationKey, DialogueState, Exchange, HistoryEntry, RetentionPolicy,
};
use errors::BackendError;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

const BACKEND: &str = "redis";
const SCAN_BATCH: usize = 200;
const KEY_PATTERNS: [&str; 3] = ["history:*", "state:*", "metadata:*"];

pub fn history_key(key: &ConversationKey) -> String {
    format!("history:{}", key.as_str())
}

pub fn state_key(key: &ConversationKey) -> String {
    format!("state:{}", key.as_str())
}

pub fn metadata_key(key: &ConversationKey) -> String {
    format!("metadata:{}", key.as_str())
}

fn map_redis_error(e: &redis::RedisError) -> BackendError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        BackendError::unavailable(BACKEND, e.to_string())
    } else {
        BackendError::command(BACKEND, e.to_string())
    }
}

fn decode_utf8(raw: Vec<u8>) -> Result<String, BackendError> {
    String::from_utf8(raw).map_err(|e| BackendError::corrupt(BACKEND, e.to_string()))
}

fn ttl_seconds(policy: &RetentionPolicy) -> i64 {
    policy.ttl.as_secs().max(1) as i64
}

pub struct RedisConversationBackend {
    connection_manager: redis::aio::ConnectionManager,
    op_timeout: Duration,
}

impl RedisConversationBackend {
    /// Connects and verifies the server answers `PING` within `timeout`.
    ///
    /// The same budget bounds every later command, so a stalled server turns
    /// into an `Unavailable` error rather than a hung request.
    pub async fn connect(connection_string: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| BackendError::unavailable(BACKEND, e.to_string()))?;

        let connection_manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                BackendError::unavailable(
                    BACKEND,
                    format!("connection not established within {}ms", timeout.as_millis()),
                )
            })?
            .map_err(|e| map_redis_error(&e))?;

        let backend = Self {
            connection_manager,
            op_timeout: timeout,
        };
        backend.ping().await?;
        tracing::info!(backend = BACKEND, "Conversation backend connected");
        Ok(backend)
    }

    pub async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.connection_manager.clone();
        let pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(BackendError::command(
                BACKEND,
                format!("unexpected PING reply: {pong}"),
            ))
        }
    }

    /// Reads the metadata hash for a conversation.
    pub async fn load_metadata(
        &self,
        key: &ConversationKey,
    ) -> Result<std::collections::HashMap<String, String>, BackendError> {
        let mut conn = self.connection_manager.clone();
        let metadata_key = metadata_key(key);
        self.bounded(async move { conn.hgetall(&metadata_key).await })
            .await
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, BackendError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(|e| map_redis_error(&e)),
            Err(_) => Err(BackendError::unavailable(
                BACKEND,
                format!("command timed out after {}ms", self.op_timeout.as_millis()),
            )),
        }
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, BackendError> {
        let mut removed = 0usize;
        let mut cursor: u64 = 0;

        loop {
            let mut conn = self.connection_manager.clone();
            let (next, keys): (u64, Vec<String>) = self
                .bounded(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let mut conn = self.connection_manager.clone();
                let deleted: usize = self.bounded(async move { conn.del(keys).await }).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

#[async_trait]
impl ConversationBackend for RedisConversationBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn load_state(&self, key: &ConversationKey) -> Result<Option<String>, BackendError> {
        let mut conn = self.connection_manager.clone();
        let state_key = state_key(key);
        let raw: Option<Vec<u8>> = self.bounded(async move { conn.get(&state_key).await }).await?;
        raw.map(decode_utf8).transpose()
    }

    async fn store_state(
        &self,
        key: &ConversationKey,
        state: DialogueState,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError> {
        let ttl = ttl_seconds(policy);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(state_key(key), state.as_ref(), ttl as u64)
            .ignore()
            .expire(history_key(key), ttl)
            .ignore()
            .expire(metadata_key(key), ttl)
            .ignore();

        let mut conn = self.connection_manager.clone();
        self.bounded(async move { pipe.query_async::<()>(&mut conn).await })
            .await
    }

    async fn load_history(&self, key: &ConversationKey) -> Result<Vec<HistoryEntry>, BackendError> {
        let mut conn = self.connection_manager.clone();
        let history_key = history_key(key);
        let lines: Vec<Vec<u8>> = self
            .bounded(async move { conn.lrange(&history_key, 0, -1).await })
            .await?;
        lines
            .into_iter()
            .map(|line| decode_utf8(line).map(|line| HistoryEntry::parse_line(&line)))
            .collect()
    }

    async fn append_exchange(
        &self,
        key: &ConversationKey,
        exchange: &Exchange,
        policy: &RetentionPolicy,
    ) -> Result<(), BackendError> {
        let ttl = ttl_seconds(policy);
        let history_key = history_key(key);
        let metadata_key = metadata_key(key);
        let last_entry = policy.entry_limit() as isize - 1;

        // The user line is pushed first so that, newest first, the reply sits
        // above the message it answers.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(&history_key, exchange.user.to_line())
            .ignore()
            .lpush(&history_key, exchange.assistant.to_line())
            .ignore()
            .ltrim(&history_key, 0, last_entry)
            .ignore()
            .expire(&history_key, ttl)
            .ignore()
            .hset(&metadata_key, "last_activity", chrono::Utc::now().to_rfc3339())
            .ignore()
            .hincr(&metadata_key, "message_count", 1)
            .ignore()
            .expire(&metadata_key, ttl)
            .ignore()
            .expire(state_key(key), ttl)
            .ignore();

        let mut conn = self.connection_manager.clone();
        self.bounded(async move { pipe.query_async::<()>(&mut conn).await })
            .await
    }

    async fn clear_all(&self) -> Result<usize, BackendError> {
        let mut removed = 0;
        for pattern in KEY_PATTERNS {
            removed += self.delete_matching(pattern).await?;
        }
        tracing::info!(backend = BACKEND, removed, "Cleared conversation records");
        Ok(removed)
    }
}
