//! Shared collector state.
//!
//! The registry maps each `CollectorKey` to a slot holding its latest
//! snapshot. Slots are allocated once, when a task is spawned, and each task
//! keeps its own `SnapshotSlot` handle; publishing is a single atomic pointer
//! swap on that slot, so writers for different keys never touch a shared lock
//! and readers always load a whole snapshot.

use crate::core::{CollectorKey, CollectorSnapshot};
use arc_swap::ArcSwapOption;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Write handle for one collector's entry.
#[derive(Debug, Clone)]
pub struct SnapshotSlot {
    inner: Arc<ArcSwapOption<CollectorSnapshot>>,
}

impl SnapshotSlot {
    fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Replaces the entry; visible to every read that starts afterwards.
    pub fn store(&self, snapshot: CollectorSnapshot) {
        self.inner.store(Some(Arc::new(snapshot)));
    }

    pub fn load(&self) -> Option<Arc<CollectorSnapshot>> {
        self.inner.load_full()
    }
}

/// Mapping from collector key to its latest snapshot.
///
/// Cloning a `Registry` yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    slots: Arc<RwLock<BTreeMap<CollectorKey, SnapshotSlot>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `key`, allocating an empty one on first use.
    ///
    /// An empty slot is invisible to `read_all` and `count` until the first
    /// store.
    pub fn slot(&self, key: &CollectorKey) -> SnapshotSlot {
        if let Some(slot) = self.read_slots().get(key) {
            return slot.clone();
        }
        let mut slots = match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.entry(key.clone()).or_insert_with(SnapshotSlot::new).clone()
    }

    /// Overwrites the entry for `key`.
    pub fn store(&self, key: &CollectorKey, snapshot: CollectorSnapshot) {
        self.slot(key).store(snapshot);
    }

    /// Latest snapshot for one key, if it has been published.
    pub fn get(&self, key: &CollectorKey) -> Option<Arc<CollectorSnapshot>> {
        self.read_slots().get(key).and_then(SnapshotSlot::load)
    }

    /// A point-in-time copy of every published entry, in key order.
    pub fn read_all(&self) -> Vec<(CollectorKey, Arc<CollectorSnapshot>)> {
        self.read_slots()
            .iter()
            .filter_map(|(key, slot)| slot.load().map(|snapshot| (key.clone(), snapshot)))
            .collect()
    }

    /// Number of keys that have published at least once.
    pub fn count(&self) -> usize {
        self.read_slots()
            .values()
            .filter(|slot| slot.inner.load().is_some())
            .count()
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<CollectorKey, SnapshotSlot>> {
        // Slots hold no invariants that a panicking writer could break.
        match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
