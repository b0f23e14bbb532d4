//! Storage backends and the cache-coherent store view
//!
//! Two backend families sit behind one [`Store`]:
//!
//! - `Local`: a synchronous [`SyncBackend`], namespaced per store
//! - `Platform`: an asynchronous store behind a [`WriteCoalescer`]
//!
//! [`Store`] layers the [`HotCache`] over either family. Mutations update
//! the cache before reaching the backend, so reads of the same key observe
//! writes in program order.

pub mod local;
pub mod platform;
pub mod registry;

pub use local::{JsonFileStore, MemoryStore, Namespaced, SyncBackend};
pub use platform::{
    AsyncBackend, DirectoryOpener, FileStore, LazyStore, MemoryAsyncStore, StoreOpener,
};
pub use registry::StoreRegistry;

use crate::cache::{CacheEntry, HotCache};
use crate::coalescer::WriteCoalescer;
use crate::error::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Physical backend of one store
#[derive(Clone)]
pub enum Backend {
    /// Synchronous backend; never suspends
    Local(Arc<dyn SyncBackend>),
    /// Asynchronous backend behind a write coalescer
    Platform(Arc<WriteCoalescer>),
}

/// One named store seen through the hot cache
pub struct Store {
    name: String,
    backend: Backend,
    cache: Arc<HotCache>,
    /// Bumped by every mutation; a read only caches its result if no
    /// mutation happened while it was in flight.
    epoch: AtomicU64,
}

impl Store {
    pub fn new(name: impl Into<String>, backend: Backend, cache: Arc<HotCache>) -> Self {
        Self {
            name: name.into(),
            backend,
            cache,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Whether reads of this store may suspend
    pub fn is_async(&self) -> bool {
        matches!(self.backend, Backend::Platform(_))
    }

    /// Read a raw value through the cache
    ///
    /// Never suspends for `Local` stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.cache.get(&self.name, key) {
            return Ok(entry.value);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let value = match &self.backend {
            Backend::Local(backend) => backend.get(key)?,
            Backend::Platform(writer) => writer.get_item(key).await?,
        };

        if self.epoch.load(Ordering::Acquire) == epoch {
            self.cache.put(
                &self.name,
                key,
                CacheEntry {
                    value: value.clone(),
                },
            );
        }
        Ok(value)
    }

    /// Write a raw value
    ///
    /// `Local` stores write immediately; `Platform` stores queue the write
    /// and return at once.
    ///
    /// # Errors
    ///
    /// Returns an error if a synchronous backend write fails. The cache
    /// already holds the new value in that case.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.write(key, value)
    }

    /// Current mutation epoch, for use with [`Store::set_if_unchanged`]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Write a raw value only if no mutation happened since `epoch` was read
    ///
    /// Returns `false` and writes nothing if the store changed in between.
    ///
    /// # Errors
    ///
    /// Returns an error if a synchronous backend write fails.
    pub fn set_if_unchanged(&self, key: &str, value: &str, epoch: u64) -> Result<bool> {
        if self
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        self.write(key, value).map(|()| true)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.cache.put(&self.name, key, CacheEntry::present(value));

        match &self.backend {
            Backend::Local(backend) => backend.set(key, value),
            Backend::Platform(writer) => {
                writer.set_item(key, value);
                Ok(())
            }
        }
    }

    /// Remove a key
    ///
    /// # Errors
    ///
    /// Returns an error if a synchronous backend delete fails.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.evict(&self.name, key);

        match &self.backend {
            Backend::Local(backend) => backend.remove(key),
            Backend::Platform(writer) => {
                writer.remove_item(key);
                Ok(())
            }
        }
    }

    /// Remove every key of this store
    ///
    /// Covers writes queued while the backend keys were being listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be listed or a synchronous delete fails.
    pub async fn clear(&self) -> Result<()> {
        let keys = match &self.backend {
            Backend::Local(backend) => backend.keys()?,
            Backend::Platform(writer) => {
                writer.flush().await;
                let mut keys: BTreeSet<String> =
                    writer.backend().keys().await?.into_iter().collect();
                keys.extend(writer.pending_keys());
                keys.into_iter().collect()
            }
        };

        for key in &keys {
            self.remove(key)?;
        }
        self.cache.evict_store(&self.name);
        log::info!("Cleared {} key(s) from store '{}'", keys.len(), self.name);
        Ok(())
    }

    /// Wait until queued writes reached the backend (no-op for `Local`)
    pub async fn flush(&self) {
        if let Backend::Platform(writer) = &self.backend {
            writer.flush().await;
        }
    }
}
