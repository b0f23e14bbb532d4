//! Scope resolution: from a semantic scope to a physical slot
//!
//! Workspace and session values share one store per workspace directory, so
//! a workspace's data can be dropped in a single operation; the key prefix
//! keeps the logical namespaces apart inside that store.

use crate::merge::Migration;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Name of the store holding global (application-wide) values
pub const GLOBAL_STORE: &str = "global";

const WORKSPACE_HEAD_LEN: usize = 12;
const CHECKSUM_BYTES: usize = 8;

/// Physical store name for a workspace directory
///
/// `"workspace." + first 12 chars of dir + "." + checksum(dir)`. The head is
/// a human hint; the SHA-256 suffix keeps workspaces with the same head apart.
#[must_use]
pub fn workspace_storage(dir: &str) -> String {
    let head: String = dir.chars().take(WORKSPACE_HEAD_LEN).collect();
    let head = if head.is_empty() {
        "workspace".to_string()
    } else {
        head
    };
    format!("workspace.{head}.{}", checksum(dir))
}

fn checksum(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .take(CHECKSUM_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Where a single persisted value lives
#[derive(Clone)]
pub struct PersistTarget {
    /// Store name; `None` is the global store
    pub store: Option<String>,
    /// Key inside the store
    pub key: String,
    /// Keys tried in the legacy store when `key` is missing, in order
    pub legacy: Vec<String>,
    /// Optional migration applied to stored values before merging
    pub migrate: Option<Migration>,
}

impl fmt::Debug for PersistTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistTarget")
            .field("store", &self.store)
            .field("key", &self.key)
            .field("legacy", &self.legacy)
            .field("migrate", &self.migrate.as_ref().map(|_| "Some(Fn)"))
            .finish()
    }
}

impl PersistTarget {
    /// A value in the global store
    pub fn global(key: impl Into<String>) -> Self {
        Self {
            store: None,
            key: key.into(),
            legacy: Vec::new(),
            migrate: None,
        }
    }

    /// A value scoped to one workspace directory
    pub fn workspace(dir: &str, name: &str) -> Self {
        Self {
            store: Some(workspace_storage(dir)),
            key: format!("workspace:{name}"),
            legacy: Vec::new(),
            migrate: None,
        }
    }

    /// A value scoped to one session inside a workspace
    pub fn session(dir: &str, session_id: &str, name: &str) -> Self {
        Self {
            store: Some(workspace_storage(dir)),
            key: format!("session:{session_id}:{name}"),
            legacy: Vec::new(),
            migrate: None,
        }
    }

    /// Session target when a session is known, workspace target otherwise
    pub fn scoped(dir: &str, session_id: Option<&str>, name: &str) -> Self {
        match session_id {
            Some(session_id) => Self::session(dir, session_id, name),
            None => Self::workspace(dir, name),
        }
    }

    /// Legacy keys to migrate from, tried in order
    #[must_use]
    pub fn with_legacy<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Migration applied to the parsed stored value before merging
    ///
    /// # Example
    ///
    /// ```rust
    /// use kvpersist::PersistTarget;
    ///
    /// let target = PersistTarget::global("layout").with_migration(|mut value| {
    ///     if let Some(obj) = value.as_object_mut() {
    ///         if let Some(width) = obj.remove("sidebarWidth") {
    ///             obj.insert("sidebar".into(), serde_json::json!({ "width": width }));
    ///         }
    ///     }
    ///     Ok(value)
    /// });
    /// ```
    #[must_use]
    pub fn with_migration<F>(mut self, migrate: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    /// Store name with the global default applied
    #[must_use]
    pub fn store_name(&self) -> &str {
        self.store.as_deref().unwrap_or(GLOBAL_STORE)
    }
}
