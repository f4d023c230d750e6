//! Unit-of-work identity map.
//!
//! Keyed by `(EntityKind, Fingerprint)`. Guarantees at most one backing-store
//! load per key within a scope, caches confirmed-absent lookups distinctly
//! from "never attempted", and evicts everything on an explicit `clear`,
//! either caller-driven or triggered by the memory governor.
//!
//! Registry operations never fail; absence of an entry is a normal outcome.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::domain::{EntityHandle, EntityKind, LifecycleState};
use crate::query::Fingerprint;

/// Cached outcome of one logical query.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Single-row hit.
    One(EntityHandle),
    /// Multi-row snapshot. An empty snapshot is still a snapshot.
    Many(Vec<EntityHandle>),
    /// Confirmed-absent lookup; prevents repeat queries for known-missing rows.
    Absent,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub value: CachedValue,
    /// Marks the entry eligible for a host-side write-behind pass instead of
    /// immediate store.
    pub deferred: bool,
}

/// Identity map for one unit-of-work scope.
pub struct EntityRegistry {
    entries: RefCell<HashMap<(EntityKind, Fingerprint), RegistryEntry>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl EntityRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        })
    }

    /// O(1) lookup. `None` means never attempted; `Some` with
    /// [`CachedValue::Absent`] means confirmed absent.
    pub fn get(&self, kind: EntityKind, fingerprint: &Fingerprint) -> Option<RegistryEntry> {
        let found = self
            .entries
            .borrow()
            .get(&(kind, fingerprint.clone()))
            .cloned();
        match &found {
            Some(_) => {
                self.hits.set(self.hits.get() + 1);
                debug!(kind, digest = fingerprint.digest(), "registry hit");
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                debug!(kind, digest = fingerprint.digest(), "registry miss");
            }
        }
        found
    }

    /// Insert or overwrite an entry. A superseded single-row handle that is
    /// not the incoming handle is marked [`LifecycleState::Stale`].
    pub fn add(
        &self,
        kind: EntityKind,
        fingerprint: Fingerprint,
        value: CachedValue,
        deferred: bool,
    ) {
        let previous = self
            .entries
            .borrow_mut()
            .insert((kind, fingerprint), RegistryEntry { value: value.clone(), deferred });

        if let Some(RegistryEntry {
            value: CachedValue::One(old),
            ..
        }) = previous
        {
            let superseded = match &value {
                CachedValue::One(new) => !Rc::ptr_eq(&old, new),
                _ => true,
            };
            if superseded {
                old.borrow_mut().mark_state(LifecycleState::Stale);
            }
        }
    }

    /// Evict all entries, marking cached handles [`LifecycleState::Evicted`].
    pub fn clear(&self) {
        let drained: Vec<RegistryEntry> = self.entries.borrow_mut().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            match entry.value {
                CachedValue::One(handle) => {
                    handle.borrow_mut().mark_state(LifecycleState::Evicted);
                }
                CachedValue::Many(handles) => {
                    for handle in handles {
                        handle.borrow_mut().mark_state(LifecycleState::Evicted);
                    }
                }
                CachedValue::Absent => {}
            }
        }
        debug!(evicted = count, "registry cleared");
    }

    /// Remove and return every deferred entry, for a write-behind pass.
    pub fn drain_deferred(&self) -> Vec<(EntityKind, Fingerprint, CachedValue)> {
        let mut entries = self.entries.borrow_mut();
        let keys: Vec<(EntityKind, Fingerprint)> = entries
            .iter()
            .filter(|(_, e)| e.deferred)
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|key| entries.remove(&key).map(|e| (key.0, key.1, e.value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.get()
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.get()
    }
}
