//! # kvpersist - Persistent key-value configuration
//!
//! A persistence layer for interactive applications that keeps user and
//! workspace settings (window layout, recent items, drafts, ...) across
//! restarts.
//!
//! ## Features
//!
//! - **Bindings**: A [`Persisted`] value loads once, then writes every change through
//! - **Scopes**: Global, per-workspace and per-session slots
//! - **Schema Evolution**: Stored JSON is merged with current defaults, so new fields appear and removed ones are kept
//! - **Legacy Keys**: Values stored under old keys move to their new slot on first read
//! - **Hot Cache**: LRU cache in front of every backend
//! - **Write Coalescing**: Rapid writes to slow asynchronous stores are batched under a throttle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kvpersist::{Persistence, PersistTarget};
//! use serde_json::json;
//!
//! let persistence = Persistence::builder("my-app")
//!     .data_dir("~/.local/share/my-app")
//!     .build()
//!     .unwrap();
//!
//! let layout = persistence.persisted(
//!     PersistTarget::global("layout"),
//!     json!({ "theme": "dark", "panels": { "left": 200, "right": 250 } }),
//! );
//!
//! layout.set_path(&["panels", "right"], json!(400));
//! ```
//!
//! ## Merge Behavior
//!
//! Stored values are merged into the defaults passed to
//! [`Persistence::persisted`]:
//!
//! - Keys missing from the stored object keep their default
//! - Keys the defaults do not know are kept as stored
//! - Arrays are replaced, never merged element-wise
//! - A stored `null` stays `null`
//!
//! When the merged result differs from what was stored, it is written back.
//!
//! ## Workspace and Session Scopes
//!
//! ```rust
//! use kvpersist::{Persistence, PersistTarget};
//! use serde_json::json;
//!
//! let persistence = Persistence::builder("my-app").in_memory().build().unwrap();
//!
//! let tabs = persistence.persisted(
//!     PersistTarget::workspace("/home/me/project", "open-tabs"),
//!     json!([]),
//! );
//! let draft = persistence.persisted(
//!     PersistTarget::session("/home/me/project", "s-42", "commit-draft"),
//!     json!(""),
//! );
//!
//! tabs.set(json!(["src/main.rs"]));
//! draft.set(json!("fix: handle empty input"));
//! ```
//!
//! ## Asynchronous Platform Stores
//!
//! ```rust,no_run
//! use kvpersist::{Persistence, PersistTarget};
//! use serde_json::json;
//!
//! # async fn example() -> kvpersist::Result<()> {
//! let persistence = Persistence::builder("my-app")
//!     .with_platform_dir()
//!     .build()?;
//!
//! let recent = persistence.persisted(PersistTarget::global("recent-models"), json!([]));
//! recent.ready().await;
//! recent.set(json!(["model-a"]));
//!
//! // Queued writes reach disk after the throttle window, or now:
//! persistence.flush().await;
//! # Ok(())
//! # }
//! ```

// Core modules
mod binding;
mod coalescer;
mod error;
mod events;
mod legacy;
mod manager;
mod merge;
mod scope;
mod sync;
pub mod cache;
pub mod security;
pub mod storage;

// Grouped modules
pub mod config;

pub use binding::Persisted;
pub use cache::{CacheEntry, CacheStrategy, HotCache};
pub use coalescer::{DEFAULT_THROTTLE, WriteCoalescer};
pub use config::{PersistConfig, PersistConfigBuilder};
pub use error::{Error, Result};
pub use events::{ChangeCallback, ChangeSource};
pub use legacy::{LegacyFallback, LegacyMove};
pub use manager::{Loaded, Persistence, PersistenceBuilder};
pub use merge::{Migration, Normalized, merge, normalize};
pub use scope::{GLOBAL_STORE, PersistTarget, workspace_storage};
pub use storage::{
    AsyncBackend, Backend, MemoryAsyncStore, MemoryStore, Store, StoreOpener, SyncBackend,
};
