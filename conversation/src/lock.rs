//! Timeout-bounded locking primitives.
//!
//! Every acquisition takes a timeout and fails with [`LockError::Timeout`]
//! instead of waiting forever. A failed or cancelled acquisition leaves no
//! trace in the lock's bookkeeping.

use errors::LockError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Mutual exclusion that gives up once its deadline passes.
#[derive(Debug, Default)]
pub struct BoundedLock {
    inner: tokio::sync::Mutex<()>,
}

pub struct BoundedGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

impl BoundedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, timeout: Duration) -> Option<BoundedGuard<'_>> {
        self.acquire_until(Instant::now() + timeout).await
    }

    pub async fn acquire_until(&self, deadline: Instant) -> Option<BoundedGuard<'_>> {
        tokio::time::timeout_at(deadline, self.inner.lock())
            .await
            .ok()
            .map(|guard| BoundedGuard { _guard: guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[derive(Debug, Default)]
struct Counters {
    readers: usize,
    writer: bool,
}

/// Many readers or one writer, with every acquisition time-bounded.
///
/// Writers first take the write gate (a [`BoundedLock`]) and raise the
/// writer flag, which stops new readers. They then wait for active readers
/// to drain. Both phases share one deadline.
#[derive(Debug)]
pub struct SharedStateLock {
    label: String,
    write_gate: BoundedLock,
    counters: Mutex<Counters>,
    changed: Notify,
}

#[must_use = "the lock is released when the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a SharedStateLock,
}

#[must_use = "the lock is released when the guard is dropped"]
pub struct WriteGuard<'a> {
    _intent: WriterIntent<'a>,
    _gate: BoundedGuard<'a>,
}

/// A raised writer flag. Lowered on drop, whether the writer got in, gave
/// up at its deadline or had its future dropped while draining readers.
struct WriterIntent<'a> {
    lock: &'a SharedStateLock,
}

impl<'a> WriterIntent<'a> {
    fn raise(lock: &'a SharedStateLock) -> Self {
        lock.counters.lock().writer = true;
        Self { lock }
    }
}

impl SharedStateLock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            write_gate: BoundedLock::new(),
            counters: Mutex::new(Counters::default()),
            changed: Notify::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn readers(&self) -> usize {
        self.counters.lock().readers
    }

    pub fn is_write_locked(&self) -> bool {
        self.counters.lock().writer
    }

    /// No reader, no writer and no writer queued on the gate.
    pub fn is_idle(&self) -> bool {
        let counters = self.counters.lock();
        counters.readers == 0 && !counters.writer && !self.write_gate.is_locked()
    }

    pub async fn read(&self, timeout: Duration) -> Result<ReadGuard<'_>, LockError> {
        let deadline = Instant::now() + timeout;
        let acquired = self
            .wait_until(deadline, |counters| {
                if counters.writer {
                    false
                } else {
                    counters.readers += 1;
                    true
                }
            })
            .await;

        if acquired {
            Ok(ReadGuard { lock: self })
        } else {
            Err(self.timeout_error("read", timeout))
        }
    }

    pub async fn write(&self, timeout: Duration) -> Result<WriteGuard<'_>, LockError> {
        let deadline = Instant::now() + timeout;

        let Some(gate) = self.write_gate.acquire_until(deadline).await else {
            return Err(self.timeout_error("write", timeout));
        };

        let intent = WriterIntent::raise(self);

        let drained = self
            .wait_until(deadline, |counters| counters.readers == 0)
            .await;

        if drained {
            Ok(WriteGuard {
                _intent: intent,
                _gate: gate,
            })
        } else {
            drop(intent);
            Err(self.timeout_error("write", timeout))
        }
    }

    /// Re-checks `ready` after every state change until it holds or the
    /// deadline passes. `ready` may only mutate the counters when it
    /// returns true.
    async fn wait_until<F>(&self, deadline: Instant, mut ready: F) -> bool
    where
        F: FnMut(&mut Counters) -> bool,
    {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if ready(&mut self.counters.lock()) {
                return true;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return ready(&mut self.counters.lock());
            }
        }
    }

    fn timeout_error(&self, mode: &'static str, timeout: Duration) -> LockError {
        LockError::Timeout {
            key: self.label.clone(),
            mode,
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let drained = {
            let mut counters = self.lock.counters.lock();
            counters.readers -= 1;
            counters.readers == 0
        };
        if drained {
            self.lock.changed.notify_waiters();
        }
    }
}

impl Drop for WriterIntent<'_> {
    fn drop(&mut self) {
        self.lock.counters.lock().writer = false;
        self.lock.changed.notify_waiters();
    }
}
