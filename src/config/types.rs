//! Configuration for the persistence layer

use crate::cache::CacheStrategy;
use crate::coalescer::DEFAULT_THROTTLE;
use crate::scope::GLOBAL_STORE;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for initializing [`Persistence`](crate::Persistence)
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Directory holding the local store file and platform store files
    pub data_dir: PathBuf,

    /// Application name (used for the default data directory)
    pub app_name: String,

    /// File name of the synchronous local store inside `data_dir`
    pub local_file: String,

    /// Sub-directory of `data_dir` holding one file per platform store
    pub stores_dir: String,

    /// Pretty-print the local store file
    pub pretty_json: bool,

    /// Throttle window of the write coalescer
    pub throttle: Duration,

    /// Hot cache strategy
    pub cache_strategy: CacheStrategy,

    /// Platform stores opened in the background at startup
    pub prefetch_stores: Vec<String>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        PersistConfigBuilder::new("app").build()
    }
}

impl PersistConfig {
    /// Create a new builder for PersistConfig
    ///
    /// # Example
    /// ```rust
    /// use kvpersist::PersistConfig;
    ///
    /// let config = PersistConfig::builder("my-app")
    ///     .data_dir("~/.local/share/my-app")
    ///     .build();
    /// ```
    pub fn builder(app_name: impl Into<String>) -> PersistConfigBuilder {
        PersistConfigBuilder::new(app_name)
    }

    /// Full path of the local store file
    pub fn local_path(&self) -> PathBuf {
        self.data_dir.join(&self.local_file)
    }

    /// Directory of the platform store files
    pub fn stores_path(&self) -> PathBuf {
        self.data_dir.join(&self.stores_dir)
    }
}

/// Builder for creating PersistConfig with a fluent API
#[derive(Debug, Clone)]
pub struct PersistConfigBuilder {
    data_dir: Option<PathBuf>,
    app_name: String,
    local_file: String,
    stores_dir: String,
    pretty_json: bool,
    throttle: Duration,
    cache_strategy: CacheStrategy,
    prefetch_stores: Vec<String>,
}

impl PersistConfigBuilder {
    /// Create a new builder with the required app name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            data_dir: None,
            app_name: app_name.into(),
            local_file: "local.json".into(),
            stores_dir: "stores".into(),
            pretty_json: false,
            throttle: DEFAULT_THROTTLE,
            cache_strategy: CacheStrategy::default(),
            prefetch_stores: vec![GLOBAL_STORE.to_string()],
        }
    }

    /// Set the data directory
    ///
    /// Supports `~` expansion for home directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let expanded = match dirs::home_dir() {
            Some(home) if path.starts_with("~") => {
                home.join(path.strip_prefix("~").unwrap_or(&path))
            }
            _ => path,
        };
        self.data_dir = Some(expanded);
        self
    }

    /// Set the local store file name (default: "local.json")
    pub fn local_file(mut self, filename: impl Into<String>) -> Self {
        self.local_file = filename.into();
        self
    }

    /// Set the platform stores sub-directory (default: "stores")
    pub fn stores_dir(mut self, dirname: impl Into<String>) -> Self {
        self.stores_dir = dirname.into();
        self
    }

    /// Pretty-print the local store file
    pub fn pretty_json(mut self) -> Self {
        self.pretty_json = true;
        self
    }

    /// Set the write coalescer throttle window (default: 250 ms)
    pub fn throttle(mut self, window: Duration) -> Self {
        self.throttle = window;
        self
    }

    /// Set the hot cache strategy (default: LRU with 1000 entries)
    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Replace the list of stores opened in the background at startup
    pub fn prefetch_stores<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefetch_stores = names.into_iter().map(Into::into).collect();
        self
    }

    /// Build the PersistConfig
    ///
    /// If `data_dir` is not set, uses the system data directory for the app.
    pub fn build(self) -> PersistConfig {
        let data_dir = self.data_dir.unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join(&self.app_name))
                .unwrap_or_else(|| PathBuf::from("."))
        });

        PersistConfig {
            data_dir,
            app_name: self.app_name,
            local_file: self.local_file,
            stores_dir: self.stores_dir,
            pretty_json: self.pretty_json,
            throttle: self.throttle,
            cache_strategy: self.cache_strategy,
            prefetch_stores: self.prefetch_stores,
        }
    }
}
