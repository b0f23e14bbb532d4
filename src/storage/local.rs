//! Synchronous key-value backends
//!
//! The synchronous family mirrors a browser-style local storage: a flat map
//! of string keys to string values with no notion of separate stores.
//! [`Namespaced`] emulates stores by prefixing every physical key.

use crate::error::{Error, Result};
use crate::sync::RwLockExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Trait for synchronous key-value backends
pub trait SyncBackend: Send + Sync {
    /// Read a raw value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// List all keys
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn keys(&self) -> Result<Vec<String>>;

    /// Backend name for logging/debugging
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// Memory Store
// =============================================================================

/// Volatile synchronous store (not persisted)
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncBackend for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read_recovered().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write_recovered()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write_recovered().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read_recovered().keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// Synchronous store kept in a single JSON object file
///
/// The whole file is loaded on open and rewritten atomically (temp file +
/// rename) after every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    pretty: bool,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store file at `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` if the file exists but cannot be read and
    /// `Error::Parse` if it is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>, pretty: bool) -> Result<Self> {
        let path = path.into();

        let entries: BTreeMap<String, String> = match crate::error::read_optional(&path)? {
            Some(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?,
            _ => BTreeMap::new(),
        };

        log::debug!(
            "Opened local store {} ({} keys)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            pretty,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = if self.pretty {
            serde_json::to_string_pretty(entries)?
        } else {
            serde_json::to_string(entries)?
        };
        write_atomic(&self.path, content.as_bytes())
    }
}

impl SyncBackend for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read_recovered().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write_recovered();
        if entries.get(key).is_some_and(|current| current == value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write_recovered();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read_recovered().keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}

/// Write a file atomically: temp file next to it, then rename
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::security::ensure_secure_dir(parent)?;
    }

    let temp_path = temp_path_for(path)?;
    std::fs::write(&temp_path, content).map_err(|e| Error::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    crate::security::set_secure_file_permissions(&temp_path)?;

    std::fs::rename(&temp_path, path).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `name.json` -> `name.json.tmp`, keeping the full original file name
pub(crate) fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        Error::Config(format!(
            "Invalid path '{}': must have a filename",
            path.display()
        ))
    })?;
    let mut temp_filename = file_name.to_os_string();
    temp_filename.push(".tmp");
    Ok(path.with_file_name(temp_filename))
}

// =============================================================================
// Namespacing
// =============================================================================

/// Per-store view over a flat synchronous backend
///
/// Every physical key is `"{store}:{key}"`.
#[derive(Clone)]
pub struct Namespaced {
    prefix: String,
    inner: Arc<dyn SyncBackend>,
}

impl Namespaced {
    pub fn new(store: &str, inner: Arc<dyn SyncBackend>) -> Self {
        Self {
            prefix: format!("{store}:"),
            inner,
        }
    }

    fn physical(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl SyncBackend for Namespaced {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(&self.physical(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(&self.physical(key), value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(&self.physical(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

// =============================================================================
// Tests
// =============================================================================
