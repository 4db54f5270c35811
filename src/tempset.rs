//! Atomically-swappable temp mod set overlay.
//!
//! Some platforms require a roster of mods to become active together or not
//! at all. The manager stages a pending id list; `close` validates the whole
//! list and then commits it in one swap, so a failed commit leaves the
//! previously committed set fully intact.

use crate::error::{Error, Result};
use crate::id::ModId;
use crate::lifecycle::{ModCollectionEntry, ModState};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TempModSetManager {
    committed: Vec<ModId>,
    pending: Vec<ModId>,
}

impl TempModSetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending overlay outright.
    pub fn init(&mut self, ids: &[ModId]) {
        self.pending.clear();
        self.extend_pending(ids);
    }

    /// Add ids to the pending overlay without activating it.
    pub fn add(&mut self, ids: &[ModId]) {
        self.extend_pending(ids);
    }

    /// Remove ids from the pending overlay without activating it.
    pub fn remove(&mut self, ids: &[ModId]) {
        self.pending.retain(|id| !ids.contains(id));
    }

    fn extend_pending(&mut self, ids: &[ModId]) {
        for &id in ids {
            if !self.pending.contains(&id) {
                self.pending.push(id);
            }
        }
    }

    /// Commit the pending overlay into the collection map.
    ///
    /// Validation runs over the whole pending list first; only once every id
    /// has passed does the map change, so either all pending entries become
    /// visible together or none do.
    pub fn close(&mut self, collection: &mut HashMap<ModId, ModCollectionEntry>) -> Result<()> {
        for &id in &self.pending {
            if !id.is_valid() {
                return Err(Error::InvalidModId);
            }
            if let Some(entry) = collection.get(&id) {
                if entry.state.is_transfer() {
                    return Err(Error::StateConflict(format!(
                        "mod {} has an active transfer, temp set cannot close",
                        id
                    )));
                }
            }
        }

        // Point of no return: everything below is infallible.
        let outgoing: Vec<ModId> = self
            .committed
            .iter()
            .copied()
            .filter(|id| !self.pending.contains(id))
            .collect();
        for id in outgoing {
            // Only entries that exist purely for the temp set go away;
            // subscriptions and real installs are left alone.
            if collection.get(&id).is_some_and(|e| e.temp) {
                collection.remove(&id);
            }
        }
        for &id in &self.pending {
            collection.entry(id).or_insert_with(|| {
                let mut entry = ModCollectionEntry::new(id, ModState::InstallationPending);
                entry.temp = true;
                entry
            });
        }
        self.committed = self.pending.clone();
        Ok(())
    }

    /// The currently committed overlay; never a partially-committed view.
    pub fn query(&self) -> Vec<ModId> {
        self.committed.clone()
    }
}
