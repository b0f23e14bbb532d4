//! Persisted bindings
//!
//! A [`Persisted`] keeps a caller-owned JSON state in sync with one
//! [`PersistTarget`]. It starts from the caller's initial value (captured
//! once as the defaults snapshot), replaces it with the stored value once
//! the initial load completes, and writes every later mutation through to
//! the store.

use crate::error::Result;
use crate::events::{ChangeListeners, ChangeSource};
use crate::legacy::LegacyFallback;
use crate::manager::io::read_through;
use crate::merge::Normalized;
use crate::scope::PersistTarget;
use crate::storage::Store;
use crate::sync::RwLockExt;
use futures::FutureExt;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;

struct BindingState {
    value: Value,
    /// Local mutations so far; the initial load is discarded once this is non-zero
    mutations: u64,
}

struct Inner {
    target: PersistTarget,
    defaults: Arc<Value>,
    store: Arc<Store>,
    legacy: Arc<LegacyFallback>,
    state: RwLock<BindingState>,
    ready: watch::Sender<bool>,
    listeners: ChangeListeners,
}

/// A JSON value bound to one persisted slot
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Persisted {
    inner: Arc<Inner>,
}

impl Persisted {
    pub(crate) fn bind(
        store: Arc<Store>,
        legacy: Arc<LegacyFallback>,
        target: PersistTarget,
        initial: Value,
        runtime: Option<&Handle>,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            target,
            defaults: Arc::new(initial.clone()),
            store,
            legacy,
            state: RwLock::new(BindingState {
                value: initial,
                mutations: 0,
            }),
            ready,
            listeners: ChangeListeners::new(),
        });

        let mut load = Box::pin(Arc::clone(&inner).initial_load());
        if !inner.store.is_async() && (&mut load).now_or_never().is_some() {
            return Self { inner };
        }

        match runtime {
            Some(runtime) => {
                runtime.spawn(load);
            }
            None => {
                warn!(
                    "No async runtime to load '{}', keeping defaults",
                    inner.target.key
                );
                inner.ready.send_replace(true);
            }
        }
        Self { inner }
    }

    /// The slot this binding persists to
    pub fn target(&self) -> &PersistTarget {
        &self.inner.target
    }

    /// The defaults snapshot taken at construction
    pub fn defaults(&self) -> &Value {
        &self.inner.defaults
    }

    /// Whether the store behind this binding is asynchronous
    pub fn is_async(&self) -> bool {
        self.inner.store.is_async()
    }

    /// Whether the initial load has completed
    ///
    /// Always `true` for synchronous stores.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait for the initial load to complete
    pub async fn ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Current value
    pub fn get(&self) -> Value {
        self.inner.state.read_recovered().value.clone()
    }

    /// Current value deserialized into `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialize` if the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        let state = self.inner.state.read_recovered();
        Ok(T::deserialize(&state.value)?)
    }

    /// Replace the whole value
    pub fn set(&self, value: Value) {
        self.update(|current| *current = value);
    }

    /// Replace the value found at `path`, creating objects along the way
    ///
    /// Segments into arrays are indices; an index one past the end appends.
    ///
    /// ```rust
    /// # use kvpersist::{Persistence, PersistTarget};
    /// # use serde_json::json;
    /// # let persistence = Persistence::builder("doc").in_memory().build().unwrap();
    /// let layout = persistence.persisted(
    ///     PersistTarget::global("layout"),
    ///     json!({ "panels": { "right": { "width": 250 } } }),
    /// );
    /// layout.set_path(&["panels", "right", "width"], json!(400));
    /// assert_eq!(layout.get()["panels"]["right"]["width"], 400);
    /// ```
    pub fn set_path(&self, path: &[&str], value: Value) {
        self.update(|current| assign_path(current, path, value));
    }

    /// Mutate the value in place and write the result through
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Value),
    {
        let inner = &self.inner;
        let (old, new) = {
            let mut state = inner.state.write_recovered();
            let old = state.value.clone();
            mutate(&mut state.value);
            state.mutations += 1;

            if state.value != old {
                inner.write_through(&state.value);
            }
            (old, state.value.clone())
        };

        inner
            .listeners
            .notify(&inner.target.key, &old, &new, ChangeSource::Local);
    }

    /// Register a listener for every change of this value
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        self.inner.listeners.on_change(callback);
    }

    /// Wait until this value's pending writes reached the backend
    pub async fn flush(&self) {
        self.inner.store.flush().await;
    }
}

impl Inner {
    async fn initial_load(self: Arc<Self>) {
        match read_through(&self.store, &self.legacy, &self.target, &self.defaults).await {
            Ok(Some(Normalized::Value { value, rewrite })) => {
                self.apply_load(value, rewrite);
            }
            Ok(Some(Normalized::Opaque(_))) => warn!(
                "Stored value for '{}' is not JSON, keeping defaults",
                self.target.key
            ),
            Ok(None) => {
                debug!("No stored value for '{}', using defaults", self.target.key);
            }
            Err(e) => warn!(
                "Failed to load '{}' from store '{}', keeping defaults: {e}",
                self.target.key,
                self.store.name()
            ),
        }

        self.ready.send_replace(true);
    }

    fn apply_load(&self, value: Value, rewrite: Option<String>) {
        let old = {
            let mut state = self.state.write_recovered();
            if state.mutations > 0 {
                debug!(
                    "Discarding initial load of '{}': changed locally while loading",
                    self.target.key
                );
                return;
            }

            if let Some(json) = rewrite {
                if let Err(e) = self.store.set(&self.target.key, &json) {
                    warn!("Failed to rewrite '{}': {e}", self.target.key);
                }
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        self.listeners
            .notify(&self.target.key, &old, &value, ChangeSource::Load);
    }

    fn write_through(&self, value: &Value) {
        let result = serde_json::to_string(value)
            .map_err(Into::into)
            .and_then(|json| self.store.set(&self.target.key, &json));

        if let Err(e) = result {
            warn!(
                "Failed to persist '{}' to store '{}': {e}",
                self.target.key,
                self.store.name()
            );
        }
    }
}

/// Array nodes take numeric segments; an index equal to the length appends.
/// Any other node on the path that is not an object becomes one.
fn assign_path(target: &mut Value, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return;
    };

    if let Value::Array(items) = target {
        match first.parse::<usize>() {
            Ok(index) if index < items.len() => {
                assign_path(&mut items[index], rest, value);
            }
            Ok(index) if index == items.len() => {
                let mut slot = Value::Null;
                assign_path(&mut slot, rest, value);
                items.push(slot);
            }
            _ => warn!(
                "Ignoring write to '{first}': not an index into an array of {}",
                items.len()
            ),
        }
        return;
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(first.to_string()).or_insert(Value::Null);
        assign_path(slot, rest, value);
    }
}
