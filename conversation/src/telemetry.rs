use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for the conversation store.
///
/// Every event is counted locally (for `stats`) and mirrored to the global
/// `metrics` recorder when one is installed.
#[derive(Debug, Default)]
pub struct ConversationTelemetry {
    reads: AtomicU64,
    writes: AtomicU64,
    lock_timeouts: AtomicU64,
    dropped_writes: AtomicU64,
    remote_errors: AtomicU64,
    fallback_uses: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounters {
    pub reads: u64,
    pub writes: u64,
    pub lock_timeouts: u64,
    pub dropped_writes: u64,
    pub remote_errors: u64,
    pub fallback_uses: u64,
}

impl ConversationTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, operation: &'static str, backend: &'static str) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_operations_total",
            "operation" => operation,
            "backend" => backend
        )
        .increment(1);
    }

    pub fn record_write(&self, operation: &'static str, backend: &'static str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_operations_total",
            "operation" => operation,
            "backend" => backend
        )
        .increment(1);
    }

    pub fn record_lock_timeout(&self, operation: &'static str, mode: &'static str) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_lock_timeouts_total",
            "operation" => operation,
            "mode" => mode
        )
        .increment(1);
    }

    pub fn record_dropped_write(&self, operation: &'static str) {
        self.dropped_writes.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_dropped_writes_total", "operation" => operation).increment(1);
    }

    pub fn record_remote_error(&self, operation: &'static str, kind: String) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_remote_errors_total",
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
    }

    pub fn record_fallback(&self, operation: &'static str) {
        self.fallback_uses.fetch_add(1, Ordering::Relaxed);
        counter!("conversation_fallback_total", "operation" => operation).increment(1);
    }

    pub fn record_population(&self, local_records: usize, lock_entries: usize) {
        gauge!("conversation_local_records").set(local_records as f64);
        gauge!("conversation_lock_entries").set(lock_entries as f64);
    }

    pub fn snapshot(&self) -> StoreCounters {
        StoreCounters {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            fallback_uses: self.fallback_uses.load(Ordering::Relaxed),
        }
    }
}
