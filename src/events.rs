//! Change notifications for persisted values
//!
//! The reactive layer that mirrors persisted state registers listeners here
//! and receives every change, whether it came from the initial load or from
//! a local mutation.

use crate::sync::RwLockExt;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Type alias for a change callback: (`key`, `old_value`, `new_value`)
pub type ChangeCallback = Arc<dyn Fn(&str, &Value, &Value) + Send + Sync>;

/// Where a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// The initial load replaced the defaults
    Load,
    /// The owner of the binding mutated the value
    Local,
}

/// Listeners registered on one persisted binding
#[derive(Default)]
pub struct ChangeListeners {
    listeners: RwLock<Vec<ChangeCallback>>,
}

impl ChangeListeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        self.listeners.write_recovered().push(Arc::new(callback));
    }

    /// Notify all listeners, skipping no-op changes
    pub fn notify(&self, key: &str, old: &Value, new: &Value, source: ChangeSource) {
        if old == new {
            return;
        }

        // Clone out so callbacks may register further listeners
        let listeners: Vec<ChangeCallback> = self.listeners.read_recovered().clone();
        log::debug!(
            "Notifying {} listener(s) of {source:?} change to '{key}'",
            listeners.len()
        );
        for listener in listeners {
            listener(key, old, new);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read_recovered().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
