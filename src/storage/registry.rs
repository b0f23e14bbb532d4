//! Process-wide registry of opened platform stores

use crate::coalescer::WriteCoalescer;
use crate::storage::platform::{LazyStore, StoreOpener};
use crate::sync::MutexExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

struct RegisteredStore {
    lazy: Arc<LazyStore>,
    writer: Arc<WriteCoalescer>,
}

/// Store-open cache: one lazily opened store and one write coalescer per name
///
/// Entries live for the lifetime of the registry; stores are never closed.
pub struct StoreRegistry {
    opener: Arc<dyn StoreOpener>,
    throttle: Duration,
    runtime: Handle,
    stores: Mutex<HashMap<String, RegisteredStore>>,
}

impl StoreRegistry {
    pub fn new(opener: Arc<dyn StoreOpener>, throttle: Duration, runtime: Handle) -> Self {
        Self {
            opener,
            throttle,
            runtime,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Write coalescer for `name`; the store itself opens on first I/O
    pub fn writer(&self, name: &str) -> Arc<WriteCoalescer> {
        let mut stores = self.stores.lock_recovered();
        let entry = stores
            .entry(name.to_string())
            .or_insert_with(|| self.register(name));
        Arc::clone(&entry.writer)
    }

    /// Open `name` in the background so the first real read does not wait
    pub fn prefetch(&self, name: &str) {
        let lazy = {
            let mut stores = self.stores.lock_recovered();
            let entry = stores
                .entry(name.to_string())
                .or_insert_with(|| self.register(name));
            Arc::clone(&entry.lazy)
        };

        if lazy.is_open() {
            return;
        }
        log::debug!("Prefetching store '{name}'");
        self.runtime.spawn(async move {
            lazy.open().await;
        });
    }

    /// Flush every registered store
    pub async fn flush_all(&self) {
        let writers: Vec<Arc<WriteCoalescer>> = self
            .stores
            .lock_recovered()
            .values()
            .map(|store| Arc::clone(&store.writer))
            .collect();

        for writer in writers {
            writer.flush().await;
        }
    }

    /// Names of every store registered so far
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.lock_recovered().keys().cloned().collect();
        names.sort();
        names
    }

    fn register(&self, name: &str) -> RegisteredStore {
        let lazy = Arc::new(LazyStore::new(name, Arc::clone(&self.opener)));
        let writer = WriteCoalescer::new(
            name,
            lazy.clone(),
            self.throttle,
            self.runtime.clone(),
        );
        RegisteredStore { lazy, writer }
    }
}
