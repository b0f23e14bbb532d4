//! Read pipeline shared by bindings and one-shot reads
//!
//! current key -> legacy keys -> parse -> migrate -> merge with defaults

use crate::error::Result;
use crate::legacy::{LegacyFallback, LegacyMove};
use crate::manager::Persistence;
use crate::merge::{Normalized, normalize};
use crate::scope::PersistTarget;
use crate::storage::Store;
use log::{debug, warn};
use serde_json::Value;

/// Outcome of a one-shot [`Persistence::read`]
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// Neither the current key nor any legacy key holds a value
    Missing,
    /// The stored value is not JSON; it is returned untouched
    Opaque(String),
    /// The stored value merged with the defaults
    Found(Value),
}

impl Loaded {
    /// The merged value, or `defaults` when nothing usable was stored
    pub fn or_defaults(self, defaults: &Value) -> Value {
        match self {
            Loaded::Found(value) => value,
            Loaded::Missing | Loaded::Opaque(_) => defaults.clone(),
        }
    }
}

/// Read `target` from `store`, falling back to its legacy keys
///
/// Returns `None` when nothing is stored. Writing back a rewrite is left to
/// the caller.
pub(crate) async fn read_through(
    store: &Store,
    legacy: &LegacyFallback,
    target: &PersistTarget,
    defaults: &Value,
) -> Result<Option<Normalized>> {
    let raw = loop {
        let epoch = store.epoch();
        if let Some(raw) = store.get(&target.key).await? {
            break raw;
        }
        match legacy.take(store, target, epoch)? {
            LegacyMove::Moved(raw) => break raw,
            LegacyMove::Absent => return Ok(None),
            // Written while we were reading; look at the current slot again
            LegacyMove::Superseded => continue,
        }
    };

    normalize(&target.key, &raw, defaults, target.migrate.as_ref()).map(Some)
}

impl Persistence {
    /// Read `target` once, merging with `defaults`
    ///
    /// Performs the same legacy fallback and write-back as a binding's
    /// initial load.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the target's migration
    /// rejects the stored value.
    pub async fn read(&self, target: &PersistTarget, defaults: &Value) -> Result<Loaded> {
        let store = self.store_for(target);

        match read_through(&store, &self.legacy, target, defaults).await? {
            None => Ok(Loaded::Missing),
            Some(Normalized::Opaque(raw)) => Ok(Loaded::Opaque(raw)),
            Some(Normalized::Value { value, rewrite }) => {
                if let Some(json) = rewrite {
                    debug!("Rewriting '{}' in store '{}'", target.key, store.name());
                    if let Err(e) = store.set(&target.key, &json) {
                        warn!("Failed to rewrite '{}': {e}", target.key);
                    }
                }
                Ok(Loaded::Found(value))
            }
        }
    }

    /// Delete the value of `target`
    ///
    /// Legacy keys are left alone; they are consumed by the next read.
    ///
    /// # Errors
    ///
    /// Returns an error if a synchronous backend delete fails.
    pub fn remove_persisted(&self, target: &PersistTarget) -> Result<()> {
        let store = self.store_for(target);
        store.remove(&target.key)?;
        debug!("Removed '{}' from store '{}'", target.key, store.name());
        Ok(())
    }
}
