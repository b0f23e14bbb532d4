//! Asynchronous key-value backends
//!
//! The asynchronous family models a platform-native store with real I/O
//! latency: stores are opened by name through a [`StoreOpener`], and every
//! read or write suspends. A store that fails to open is replaced by a
//! volatile [`MemoryAsyncStore`] for the rest of the process.

use crate::error::{Error, Result};
use crate::storage::local::temp_path_for;
use crate::sync::RwLockExt;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OnceCell};

/// Backend trait for asynchronous key-value stores.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait AsyncBackend: Send + Sync + 'static {
    /// Retrieves a raw value by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a raw value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes a key. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists all keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Backend name for logging/debugging
    fn backend_name(&self) -> &'static str;
}

/// Opens named platform stores
///
/// This is the platform's `storage(name)` factory. Opening may fail, for
/// example when the platform sandbox denies access.
#[async_trait]
pub trait StoreOpener: Send + Sync + 'static {
    /// Open the store called `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreOpen` (or an I/O error) if the store cannot be opened.
    async fn open(&self, name: &str) -> Result<Arc<dyn AsyncBackend>>;
}

// =============================================================================
// Memory Store
// =============================================================================

/// Volatile asynchronous store; also the stand-in for stores that failed to open
#[derive(Default)]
pub struct MemoryAsyncStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryAsyncStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AsyncBackend for MemoryAsyncStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read_recovered().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write_recovered()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write_recovered().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read_recovered().keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// File Store
// =============================================================================

/// One store per JSON file, read on open and rewritten on every mutation
///
/// Mutations are serialized by an async mutex held across the file write,
/// so the file always reflects a prefix of the applied operations.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store file, creating an empty store if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` if the file cannot be read and
    /// `Error::Parse` if it is not a JSON object of strings.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries: BTreeMap<String, String> = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::FileRead { path, source: e }),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_vec(entries)?;
        let temp_path = temp_path_for(&self.path)?;

        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| Error::FileWrite {
                path: temp_path.clone(),
                source: e,
            })?;
        crate::security::set_secure_file_permissions(&temp_path)?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::FileWrite {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl AsyncBackend for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Opens [`FileStore`]s inside one directory
pub struct DirectoryOpener {
    dir: PathBuf,
}

impl DirectoryOpener {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing the store `name`
    #[must_use]
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.join(store_file_name(name))
    }
}

#[async_trait]
impl StoreOpener for DirectoryOpener {
    async fn open(&self, name: &str) -> Result<Arc<dyn AsyncBackend>> {
        crate::security::ensure_secure_dir(&self.dir).map_err(|e| Error::StoreOpen {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let store = FileStore::open(self.store_path(name)).await?;
        debug!("Opened platform store '{name}' at {}", store.path().display());
        Ok(Arc::new(store))
    }
}

/// File name for a store: anything outside `[A-Za-z0-9._-]` becomes `_`
///
/// Workspace store names embed a path prefix; their checksum suffix keeps the
/// sanitized names distinct.
#[must_use]
pub fn store_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.json")
}

// =============================================================================
// Lazy Store
// =============================================================================

/// A named store opened on first use
///
/// The open happens at most once. On failure the store is replaced by a
/// [`MemoryAsyncStore`] and never retried; callers never see the failure.
pub struct LazyStore {
    name: String,
    opener: Arc<dyn StoreOpener>,
    backend: OnceCell<Arc<dyn AsyncBackend>>,
}

impl LazyStore {
    pub fn new(name: impl Into<String>, opener: Arc<dyn StoreOpener>) -> Self {
        Self {
            name: name.into(),
            opener,
            backend: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the open already happened (successfully or not)
    pub fn is_open(&self) -> bool {
        self.backend.initialized()
    }

    /// Open the store now if it is not open yet
    pub async fn open(&self) -> &Arc<dyn AsyncBackend> {
        self.backend
            .get_or_init(|| async {
                match self.opener.open(&self.name).await {
                    Ok(backend) => backend,
                    Err(e) => {
                        warn!(
                            "Store '{}' unavailable, using a volatile in-memory store: {e}",
                            self.name
                        );
                        Arc::new(MemoryAsyncStore::new()) as Arc<dyn AsyncBackend>
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl AsyncBackend for LazyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.open().await.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.open().await.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.open().await.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.open().await.keys().await
    }

    fn backend_name(&self) -> &'static str {
        match self.backend.get() {
            Some(backend) => backend.backend_name(),
            None => "unopened",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
