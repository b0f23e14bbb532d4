//! Write coalescing for asynchronous backends
//!
//! Turns arbitrarily frequent `set_item` / `remove_item` calls into batched
//! backend writes under a leading+trailing throttle:
//!
//! - every mutation lands in a pending map, replacing any earlier pending
//!   write for the same key;
//! - if the last flush started more than one throttle window ago, a flush
//!   starts right away (leading edge);
//! - a trailing flush is always re-armed one window from now.
//!
//! Reads consult the pending map before the backend, so a write is visible
//! to readers immediately even though it reaches the backend later.

use crate::error::Result;
use crate::storage::platform::AsyncBackend;
use crate::sync::MutexExt;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default throttle window between backend flushes
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(250);

/// The single outstanding write for one key; `value: None` is a tombstone
#[derive(Debug, Clone)]
struct PendingWrite {
    value: Option<String>,
    seq: u64,
}

#[derive(Default)]
struct CoalescerState {
    pending: HashMap<String, PendingWrite>,
    next_seq: u64,
    last_flush: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
}

/// Batches writes to one asynchronous store
pub struct WriteCoalescer {
    name: String,
    backend: Arc<dyn AsyncBackend>,
    throttle: Duration,
    runtime: Handle,
    state: Mutex<CoalescerState>,
    /// Held for the whole of a flush; late callers wait for the running one
    flush_lock: tokio::sync::Mutex<()>,
    this: Weak<WriteCoalescer>,
}

impl WriteCoalescer {
    /// Wrap `backend`; timers and leading flushes are spawned on `runtime`
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn AsyncBackend>,
        throttle: Duration,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.into(),
            backend,
            throttle,
            runtime,
            state: Mutex::new(CoalescerState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            this: this.clone(),
        })
    }

    /// Store name this coalescer writes to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped backend
    pub fn backend(&self) -> &Arc<dyn AsyncBackend> {
        &self.backend
    }

    /// Read a value, preferring a not-yet-flushed write
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let pending = self
            .state
            .lock_recovered()
            .pending
            .get(key)
            .map(|write| write.value.clone());
        match pending {
            Some(value) => Ok(value),
            None => self.backend.get(key).await,
        }
    }

    /// Queue a write
    pub fn set_item(&self, key: &str, value: &str) {
        self.enqueue(key, Some(value.to_string()));
    }

    /// Queue a delete
    pub fn remove_item(&self, key: &str) {
        self.enqueue(key, None);
    }

    /// Keys with a queued write that is not a delete
    pub fn pending_keys(&self) -> Vec<String> {
        self.state
            .lock_recovered()
            .pending
            .iter()
            .filter(|(_, write)| write.value.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of keys waiting to be flushed
    pub fn pending_len(&self) -> usize {
        self.state.lock_recovered().pending.len()
    }

    fn enqueue(&self, key: &str, value: Option<String>) {
        {
            let mut state = self.state.lock_recovered();
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .pending
                .insert(key.to_string(), PendingWrite { value, seq });
        }
        self.schedule();
    }

    fn schedule(&self) {
        let now = Instant::now();
        let mut state = self.state.lock_recovered();

        let idle = state
            .last_flush
            .is_none_or(|last| now.duration_since(last) > self.throttle);
        if idle {
            state.last_flush = Some(now);
            let this = self.this.clone();
            self.runtime.spawn(async move {
                if let Some(this) = this.upgrade() {
                    this.flush().await;
                }
            });
        }

        if let Some(previous) = state.trailing.take() {
            previous.abort();
        }

        let this = self.this.clone();
        let throttle = self.throttle;
        let runtime = self.runtime.clone();
        state.trailing = Some(self.runtime.spawn(async move {
            tokio::time::sleep(throttle).await;
            // The flush runs in its own task so re-arming the timer can
            // never cancel a flush that already started.
            runtime.spawn(async move {
                if let Some(this) = this.upgrade() {
                    this.flush().await;
                }
            });
        }));
    }

    /// Apply every pending write to the backend
    ///
    /// Concurrent callers queue behind the running flush. Writes that arrive
    /// mid-flush are drained by the same call. Backend failures are logged
    /// and the write is dropped; it is not retried.
    pub async fn flush(&self) {
        let _flushing = self.flush_lock.lock().await;
        self.state.lock_recovered().last_flush = Some(Instant::now());

        let mut applied = 0usize;
        loop {
            let next = {
                let state = self.state.lock_recovered();
                state
                    .pending
                    .iter()
                    .next()
                    .map(|(key, write)| (key.clone(), write.clone()))
            };
            let Some((key, write)) = next else {
                break;
            };

            let result = match &write.value {
                Some(value) => self.backend.set(&key, value).await,
                None => self.backend.delete(&key).await,
            };
            if let Err(e) = result {
                warn!("Dropping write of '{key}' to store '{}': {e}", self.name);
            }

            let mut state = self.state.lock_recovered();
            if state
                .pending
                .get(&key)
                .is_some_and(|current| current.seq == write.seq)
            {
                state.pending.remove(&key);
            }
            applied += 1;
        }

        if applied > 0 {
            debug!("Flushed {applied} write(s) to store '{}'", self.name);
        }
    }
}

impl Drop for WriteCoalescer {
    fn drop(&mut self) {
        if let Some(trailing) = self.state.lock_recovered().trailing.take() {
            trailing.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::platform::MemoryAsyncStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every backend call
    #[derive(Default)]
    struct RecordingBackend {
        inner: MemoryAsyncStore,
        calls: Mutex<Vec<(String, Option<String>)>>,
        fail: AtomicBool,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock_recovered().clone()
        }
    }

    #[async_trait]
    impl AsyncBackend for RecordingBackend {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.calls
                .lock_recovered()
                .push((key.to_string(), Some(value.to_string())));
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Backend("disk full".into()));
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.calls.lock_recovered().push((key.to_string(), None));
            self.inner.delete(key).await
        }

        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    fn coalescer(backend: &Arc<RecordingBackend>) -> Arc<WriteCoalescer> {
        WriteCoalescer::new(
            "global",
            backend.clone(),
            DEFAULT_THROTTLE,
            Handle::current(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_your_writes_before_flush() {
        let backend = Arc::new(RecordingBackend::default());
        let writer = coalescer(&backend);

        writer.set_item("k", "v");
        assert_eq!(writer.get_item("k").await.unwrap(), Some("v".to_string()));

        writer.remove_item("k");
        assert_eq!(writer.get_item("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_writes_coalesce_into_one() {
        let backend = Arc::new(RecordingBackend::default());
        let writer = coalescer(&backend);

        for i in 1..=5 {
            writer.set_item("k", &format!("v{i}"));
        }
        tokio::time::sleep(DEFAULT_THROTTLE * 2).await;

        assert_eq!(backend.calls(), vec![("k".to_string(), Some("v5".to_string()))]);
        assert_eq!(writer.pending_len(), 0);
        assert_eq!(backend.inner.get("k").await.unwrap(), Some("v5".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_flush_picks_up_later_writes() {
        let backend = Arc::new(RecordingBackend::default());
        let writer = coalescer(&backend);

        // Leading edge flushes the first write right away
        writer.set_item("a", "1");
        tokio::task::yield_now().await;
        assert_eq!(backend.calls().len(), 1);

        // Inside the window: only the trailing flush may write
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.set_item("a", "2");
        writer.set_item("b", "x");
        tokio::task::yield_now().await;
        assert_eq!(backend.calls().len(), 1);

        tokio::time::sleep(DEFAULT_THROTTLE * 2).await;
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&("a".to_string(), Some("2".to_string()))));
        assert!(calls.contains(&("b".to_string(), Some("x".to_string()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tombstone_flushes_as_delete() {
        let backend = Arc::new(RecordingBackend::default());
        backend.inner.set("k", "old").await.unwrap();
        let writer = coalescer(&backend);

        writer.remove_item("k");
        writer.flush().await;

        assert_eq!(backend.calls(), vec![("k".to_string(), None)]);
        assert_eq!(backend.inner.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_dropped_not_retried() {
        let backend = Arc::new(RecordingBackend::default());
        backend.fail.store(true, Ordering::SeqCst);
        let writer = coalescer(&backend);

        writer.set_item("k", "v");
        writer.flush().await;
        assert_eq!(writer.pending_len(), 0);

        tokio::time::sleep(DEFAULT_THROTTLE * 4).await;
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_flushes_apply_each_write_once() {
        let backend = Arc::new(RecordingBackend::default());
        let writer = coalescer(&backend);

        writer.set_item("a", "1");
        writer.set_item("b", "2");
        tokio::join!(writer.flush(), writer.flush(), writer.flush());

        let mut calls = backend.calls();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                ("a".to_string(), Some("1".to_string())),
                ("b".to_string(), Some("2".to_string())),
            ]
        );
    }
}
