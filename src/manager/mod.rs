//! Main persistence facade
//!
//! This module contains the [`Persistence`] struct which owns the process-wide
//! pieces (hot cache, local store, platform store registry) and hands out
//! [`Persisted`] bindings.

mod builder;
pub(crate) mod io;

pub use builder::PersistenceBuilder;
pub use io::Loaded;

use crate::binding::Persisted;
use crate::cache::HotCache;
use crate::config::PersistConfig;
use crate::error::Result;
use crate::legacy::LegacyFallback;
use crate::scope::{self, PersistTarget};
use crate::storage::{Backend, Namespaced, Store, StoreRegistry, SyncBackend};
use crate::sync::RwLockExt;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;

/// Entry point for persisted configuration values.
///
/// - **Bindings**: [`persisted`](Self::persisted) keeps a JSON value in sync
///   with one slot
/// - **Scopes**: global, per-workspace and per-session slots via
///   [`PersistTarget`]
/// - **Migration**: stored values are merged with current defaults and
///   legacy keys are moved on first read
/// - **Caching**: reads go through a shared hot cache
/// - **Coalescing**: writes to platform stores are batched
///
/// # Example
///
/// ```rust
/// use kvpersist::{Persistence, PersistTarget};
/// use serde_json::json;
///
/// let persistence = Persistence::builder("my-app").in_memory().build().unwrap();
///
/// let layout = persistence.persisted(
///     PersistTarget::global("layout"),
///     json!({ "sidebar": { "width": 250, "open": true } }),
/// );
/// assert!(layout.is_ready());
///
/// layout.set_path(&["sidebar", "width"], json!(320));
/// assert_eq!(layout.get()["sidebar"]["width"], 320);
/// ```
pub struct Persistence {
    pub(crate) config: PersistConfig,
    pub(crate) cache: Arc<HotCache>,
    pub(crate) local: Arc<dyn SyncBackend>,
    pub(crate) legacy: Arc<LegacyFallback>,
    pub(crate) platform: Option<StoreRegistry>,
    pub(crate) runtime: Option<Handle>,
    pub(crate) stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl Persistence {
    /// Create a builder
    pub fn builder(app_name: impl Into<String>) -> PersistenceBuilder {
        PersistenceBuilder::new(app_name)
    }

    /// Configuration this instance was built with
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// The shared hot cache
    pub fn cache(&self) -> &Arc<HotCache> {
        &self.cache
    }

    /// Whether named stores go through an asynchronous platform backend
    pub fn is_async(&self) -> bool {
        self.platform.is_some()
    }

    /// Storage name for a workspace directory
    pub fn workspace_storage(dir: &str) -> String {
        scope::workspace_storage(dir)
    }

    /// Cache-coherent view of the store called `name`
    ///
    /// Views are created once per name and shared.
    pub fn store(&self, name: &str) -> Arc<Store> {
        if let Some(store) = self.stores.read_recovered().get(name) {
            return Arc::clone(store);
        }

        let mut stores = self.stores.write_recovered();
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(self.open_store(name)));
        Arc::clone(store)
    }

    /// Store view holding `target`
    pub fn store_for(&self, target: &PersistTarget) -> Arc<Store> {
        self.store(target.store_name())
    }

    fn open_store(&self, name: &str) -> Store {
        let backend = match &self.platform {
            Some(registry) => Backend::Platform(registry.writer(name)),
            None => Backend::Local(Arc::new(Namespaced::new(name, Arc::clone(&self.local)))),
        };
        debug!("Created view of store '{name}'");
        Store::new(name, backend, Arc::clone(&self.cache))
    }

    /// Bind `initial` to `target`
    ///
    /// `initial` is also the defaults snapshot stored values are merged with.
    /// Synchronous stores load before this returns; asynchronous stores load
    /// in the background, see [`Persisted::ready`].
    pub fn persisted(&self, target: PersistTarget, initial: Value) -> Persisted {
        let store = self.store_for(&target);
        Persisted::bind(
            store,
            Arc::clone(&self.legacy),
            target,
            initial,
            self.runtime.as_ref(),
        )
    }

    /// Bind a serializable initial value to `target`
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialize` if `initial` cannot be represented as JSON.
    pub fn persisted_typed<T: Serialize>(
        &self,
        target: PersistTarget,
        initial: &T,
    ) -> Result<Persisted> {
        Ok(self.persisted(target, serde_json::to_value(initial)?))
    }

    /// Start opening platform stores in the background
    ///
    /// No-op without a platform backend.
    pub fn prefetch<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(registry) = &self.platform {
            for name in names {
                registry.prefetch(name.as_ref());
            }
        }
    }

    /// Start opening the store of a workspace directory in the background
    pub fn prefetch_workspace_storage(&self, dir: &str) {
        self.prefetch([scope::workspace_storage(dir)]);
    }

    /// Wait until every queued platform write reached its backend
    pub async fn flush(&self) {
        if let Some(registry) = &self.platform {
            registry.flush_all().await;
        }
    }

    /// Delete every key of one store
    ///
    /// # Errors
    ///
    /// Returns an error if the store's keys cannot be listed or deleted.
    pub async fn clear_store(&self, name: &str) -> Result<()> {
        self.store(name).clear().await
    }
}
