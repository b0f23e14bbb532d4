//! One-shot migration from legacy keys
//!
//! Older releases kept values directly in the flat local store under keys of
//! their own. When a target's current key is missing, its legacy keys are
//! tried in order; the first hit is moved (copied, then deleted) into the
//! target's current slot.

use crate::error::Result;
use crate::scope::PersistTarget;
use crate::storage::{Store, SyncBackend};
use log::{debug, info};
use std::sync::Arc;

/// Result of probing the legacy keys of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyMove {
    /// No legacy key holds a value
    Absent,
    /// The value was copied into the current slot and the legacy entry deleted
    Moved(String),
    /// The store was written since the read began; nothing was moved
    Superseded,
}

/// Moves values from the legacy store into their current location
pub struct LegacyFallback {
    legacy: Arc<dyn SyncBackend>,
}

impl LegacyFallback {
    /// `legacy` is the un-namespaced local store
    pub fn new(legacy: Arc<dyn SyncBackend>) -> Self {
        Self { legacy }
    }

    /// Move the first present legacy value of `target` into `store`
    ///
    /// `epoch` is the [`Store::epoch`] observed before the current slot was
    /// found empty. If the store has been written since, the copy would
    /// clobber that write, so nothing moves and the legacy entry stays.
    /// Otherwise the legacy entry is deleted after the copy, so a value never
    /// lives in both places afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy store cannot be read or written, or if
    /// a synchronous current store rejects the copy.
    pub fn take(&self, store: &Store, target: &PersistTarget, epoch: u64) -> Result<LegacyMove> {
        for legacy_key in &target.legacy {
            let Some(raw) = self.legacy.get(legacy_key)? else {
                continue;
            };

            if !store.set_if_unchanged(&target.key, &raw, epoch)? {
                debug!(
                    "Store '{}' changed while loading '{}', leaving legacy key '{legacy_key}'",
                    store.name(),
                    target.key
                );
                return Ok(LegacyMove::Superseded);
            }
            self.legacy.remove(legacy_key)?;
            info!(
                "Migrated legacy key '{legacy_key}' to '{}' in store '{}'",
                target.key,
                store.name()
            );
            return Ok(LegacyMove::Moved(raw));
        }
        Ok(LegacyMove::Absent)
    }
}
