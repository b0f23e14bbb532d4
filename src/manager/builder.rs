//! Builder for Persistence
//!
//! This module contains [`PersistenceBuilder`] which provides a fluent API
//! for creating a [`Persistence`](super::Persistence).

use crate::cache::{CacheStrategy, HotCache};
use crate::config::{PersistConfig, PersistConfigBuilder};
use crate::error::{Error, Result};
use crate::legacy::LegacyFallback;
use crate::security;
use crate::storage::{
    DirectoryOpener, JsonFileStore, MemoryStore, StoreOpener, StoreRegistry, SyncBackend,
};
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;

use super::Persistence;

enum LocalChoice {
    File,
    Memory,
    Custom(Arc<dyn SyncBackend>),
}

enum PlatformChoice {
    None,
    Directory,
    Custom(Arc<dyn StoreOpener>),
}

/// Builder for creating a [`Persistence`] with a fluent API.
///
/// # Example
///
/// ```rust,no_run
/// use kvpersist::Persistence;
/// use std::time::Duration;
///
/// # async fn example() -> kvpersist::Result<()> {
/// let persistence = Persistence::builder("my-app")
///     .data_dir("~/.local/share/my-app")
///     .throttle(Duration::from_millis(500))
///     .with_platform_dir()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PersistenceBuilder {
    config_builder: PersistConfigBuilder,
    local: LocalChoice,
    platform: PlatformChoice,
}

impl PersistenceBuilder {
    /// Create a new builder with the required app name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            config_builder: PersistConfigBuilder::new(app_name),
            local: LocalChoice::File,
            platform: PlatformChoice::None,
        }
    }

    /// Set the data directory.
    ///
    /// Supports `~` expansion for home directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_builder = self.config_builder.data_dir(path);
        self
    }

    /// Set the local store filename (default: "local.json").
    pub fn local_file(mut self, filename: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.local_file(filename);
        self
    }

    /// Pretty-print the local store file.
    pub fn pretty_json(mut self) -> Self {
        self.config_builder = self.config_builder.pretty_json();
        self
    }

    /// Set the write coalescer throttle window.
    pub fn throttle(mut self, window: Duration) -> Self {
        self.config_builder = self.config_builder.throttle(window);
        self
    }

    /// Set the hot cache strategy.
    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.config_builder = self.config_builder.cache_strategy(strategy);
        self
    }

    /// Replace the list of platform stores opened in the background at build time.
    pub fn prefetch_stores<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_builder = self.config_builder.prefetch_stores(names);
        self
    }

    /// Keep the synchronous store in memory instead of the local file.
    pub fn in_memory(mut self) -> Self {
        self.local = LocalChoice::Memory;
        self
    }

    /// Use a custom synchronous backend for the local store.
    pub fn local_backend(mut self, backend: Arc<dyn SyncBackend>) -> Self {
        self.local = LocalChoice::Custom(backend);
        self
    }

    /// Route named stores through an asynchronous platform backend.
    ///
    /// Without a platform every store lives in the synchronous local store.
    pub fn with_platform(mut self, opener: Arc<dyn StoreOpener>) -> Self {
        self.platform = PlatformChoice::Custom(opener);
        self
    }

    /// Use one file per store under the configured stores directory.
    pub fn with_platform_dir(mut self) -> Self {
        self.platform = PlatformChoice::Directory;
        self
    }

    /// Build the [`Persistence`].
    ///
    /// A local store file that cannot be opened degrades to an in-memory
    /// store. Configured prefetch stores start opening in the background.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCacheStrategy` for an unusable cache strategy
    /// and `Error::NoRuntime` if a platform is configured outside a tokio
    /// runtime.
    pub fn build(self) -> Result<Persistence> {
        let config = self.config_builder.build();
        let cache = Arc::new(HotCache::new(config.cache_strategy)?);
        let runtime = Handle::try_current().ok();

        let local: Arc<dyn SyncBackend> = match self.local {
            LocalChoice::File => open_local(&config),
            LocalChoice::Memory => Arc::new(MemoryStore::new()),
            LocalChoice::Custom(backend) => backend,
        };

        let opener: Option<Arc<dyn StoreOpener>> = match self.platform {
            PlatformChoice::None => None,
            PlatformChoice::Directory => {
                Some(Arc::new(DirectoryOpener::new(config.stores_path())))
            }
            PlatformChoice::Custom(opener) => Some(opener),
        };

        let platform = match opener {
            Some(opener) => {
                let runtime = runtime.clone().ok_or(Error::NoRuntime)?;
                let registry = StoreRegistry::new(opener, config.throttle, runtime);
                for name in &config.prefetch_stores {
                    registry.prefetch(name);
                }
                Some(registry)
            }
            None => None,
        };

        info!(
            "Persistence ready for '{}' (local: {}, platform: {})",
            config.app_name,
            local.backend_name(),
            if platform.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Persistence {
            legacy: Arc::new(LegacyFallback::new(Arc::clone(&local))),
            config,
            cache,
            local,
            platform,
            runtime,
            stores: RwLock::new(HashMap::new()),
        })
    }
}

fn open_local(config: &PersistConfig) -> Arc<dyn SyncBackend> {
    let opened = security::ensure_secure_dir(&config.data_dir)
        .and_then(|()| JsonFileStore::open(config.local_path(), config.pretty_json));

    match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                "Failed to open local store {}, falling back to memory: {e}",
                config.local_path().display()
            );
            Arc::new(MemoryStore::new())
        }
    }
}
