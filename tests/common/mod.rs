//! Common test utilities for kvpersist integration tests
//!
//! Provides shared fixtures, instrumented platform backends, and helper
//! functions.

#![allow(dead_code)]

use async_trait::async_trait;
use kvpersist::{
    AsyncBackend, Error, MemoryAsyncStore, Persistence, Result, StoreOpener,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Throttle used by platform fixtures so trailing flushes happen quickly
pub const TEST_THROTTLE: Duration = Duration::from_millis(20);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Layout defaults used across tests
pub fn default_layout() -> Value {
    json!({
        "theme": "dark",
        "panels": { "left": 200, "right": 250 }
    })
}

// =============================================================================
// Test Fixtures
// =============================================================================

/// Test fixture that provides a temporary data directory and a Persistence
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub persistence: Persistence,
}

impl TestFixture {
    /// Local file store only; every store is synchronous
    pub fn new() -> Self {
        init_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let persistence = local_persistence(&temp_dir);
        Self {
            temp_dir,
            persistence,
        }
    }

    /// Local file store plus one platform file per store
    ///
    /// Must be called from inside a tokio runtime.
    pub fn with_platform() -> Self {
        init_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let persistence = platform_persistence(&temp_dir);
        Self {
            temp_dir,
            persistence,
        }
    }

    /// Local file store seeded with raw entries before anything opens it
    pub fn with_local_file(entries: &[(&str, &str)]) -> Self {
        init_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let map: BTreeMap<&str, &str> = entries.iter().copied().collect();
        std::fs::write(
            temp_dir.path().join("local.json"),
            serde_json::to_string(&map).unwrap(),
        )
        .unwrap();

        let persistence = local_persistence(&temp_dir);
        Self {
            temp_dir,
            persistence,
        }
    }

    /// A second Persistence over the same directory, as after a restart
    pub fn reopen(&self) -> Persistence {
        local_persistence(&self.temp_dir)
    }

    /// A second platform-backed Persistence over the same directory
    pub fn reopen_platform(&self) -> Persistence {
        platform_persistence(&self.temp_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn local_path(&self) -> PathBuf {
        self.temp_dir.path().join("local.json")
    }

    /// Raw entries of the local store file
    pub fn read_local_file(&self) -> BTreeMap<String, String> {
        read_store_file(&self.local_path())
    }

    /// Raw entries of one platform store file
    pub fn read_platform_file(&self, store: &str) -> BTreeMap<String, String> {
        let path = self
            .temp_dir
            .path()
            .join("stores")
            .join(kvpersist::storage::platform::store_file_name(store));
        read_store_file(&path)
    }
}

pub fn local_persistence(dir: &TempDir) -> Persistence {
    Persistence::builder("test-app")
        .data_dir(dir.path())
        .build()
        .expect("Failed to build persistence")
}

pub fn platform_persistence(dir: &TempDir) -> Persistence {
    Persistence::builder("test-app")
        .data_dir(dir.path())
        .throttle(TEST_THROTTLE)
        .with_platform_dir()
        .build()
        .expect("Failed to build persistence")
}

pub fn read_store_file(path: &std::path::Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).expect("Store file is not a JSON object"),
        Err(_) => BTreeMap::new(),
    }
}

// =============================================================================
// Instrumented Platform Backends
// =============================================================================

/// Memory backend that records every write reaching it
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryAsyncStore,
    pub sets: Mutex<Vec<(String, String)>>,
    pub deletes: AtomicUsize,
}

impl CountingStore {
    pub fn sets(&self) -> Vec<(String, String)> {
        self.sets.lock().unwrap().clone()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncBackend for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.sets
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Opener handing out one shared [`CountingStore`] per store name
#[derive(Default)]
pub struct CountingOpener {
    stores: Mutex<BTreeMap<String, Arc<CountingStore>>>,
    pub opens: AtomicUsize,
}

impl CountingOpener {
    /// The store behind `name`, created on demand so tests can seed it
    pub fn store(&self, name: &str) -> Arc<CountingStore> {
        Arc::clone(
            self.stores
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default(),
        )
    }
}

#[async_trait]
impl StoreOpener for CountingOpener {
    async fn open(&self, name: &str) -> Result<Arc<dyn AsyncBackend>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.store(name))
    }
}

/// [`CountingOpener`] that takes `delay` to open each store
pub struct SlowOpener {
    pub inner: CountingOpener,
    pub delay: Duration,
}

impl SlowOpener {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: CountingOpener::default(),
            delay,
        }
    }
}

#[async_trait]
impl StoreOpener for SlowOpener {
    async fn open(&self, name: &str) -> Result<Arc<dyn AsyncBackend>> {
        tokio::time::sleep(self.delay).await;
        self.inner.open(name).await
    }
}

/// Opener that always fails
pub struct FailingOpener;

#[async_trait]
impl StoreOpener for FailingOpener {
    async fn open(&self, name: &str) -> Result<Arc<dyn AsyncBackend>> {
        Err(Error::StoreOpen {
            name: name.to_string(),
            reason: "platform storage unavailable".into(),
        })
    }
}

/// In-memory Persistence over a [`CountingOpener`]
///
/// Must be called from inside a tokio runtime.
pub fn counting_persistence(opener: &Arc<CountingOpener>) -> Persistence {
    init_logging();
    Persistence::builder("test-app")
        .in_memory()
        .throttle(TEST_THROTTLE)
        .with_platform(opener.clone())
        .build()
        .expect("Failed to build persistence")
}
