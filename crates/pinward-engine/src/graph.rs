//! Lock registry and parent/child links.
//!
//! Locks refer to their parent by name in configuration. The registry turns
//! names into ids and keeps both directions of every link consistent:
//!
//! - a child's `parent_id` names a lock in the registry, or is `None`
//! - a parent's `child_ids` lists exactly the locks whose `parent_id` is it
//!
//! [`LockRegistry::rebuild`] restores these after any insert, update or
//! delete. It never fails: dangling links are dropped and logged.

use pinward_core::{Lock, LockId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What a [`LockRegistry::rebuild`] pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Children whose `parent_id` was resolved from their parent name.
    pub resolved: usize,
    /// Child ids added to a parent.
    pub attached: usize,
    /// Stale child ids removed from a parent.
    pub pruned: usize,
    /// Dangling `parent_id`s cleared.
    pub cleared: usize,
}

impl RebuildReport {
    pub fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// All managed locks, keyed by id.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: BTreeMap<LockId, Lock>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a lock. Links are not updated until
    /// [`rebuild`](Self::rebuild).
    pub fn insert(&mut self, lock: Lock) -> Option<Lock> {
        self.locks.insert(lock.id.clone(), lock)
    }

    pub fn remove(&mut self, id: &LockId) -> Option<Lock> {
        self.locks.remove(id)
    }

    pub fn get(&self, id: &LockId) -> Option<&Lock> {
        self.locks.get(id)
    }

    pub fn get_mut(&mut self, id: &LockId) -> Option<&mut Lock> {
        self.locks.get_mut(id)
    }

    pub fn contains(&self, id: &LockId) -> bool {
        self.locks.contains_key(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Lock> {
        self.locks.values().find(|lock| lock.name == name)
    }

    pub fn ids(&self) -> Vec<LockId> {
        self.locks.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Locks whose parent is `id`.
    pub fn children_of(&self, id: &LockId) -> Vec<LockId> {
        self.locks
            .values()
            .filter(|lock| lock.parent_id.as_ref() == Some(id))
            .map(|lock| lock.id.clone())
            .collect()
    }

    /// Every (parent, child) pair, parents in id order.
    pub fn links(&self) -> Vec<(LockId, LockId)> {
        self.locks
            .values()
            .flat_map(|parent| {
                parent
                    .child_ids
                    .iter()
                    .map(move |child| (parent.id.clone(), child.clone()))
            })
            .collect()
    }

    /// Resolve parent names and make both link directions agree.
    pub fn rebuild(&mut self) -> RebuildReport {
        let mut report = RebuildReport::default();

        let names: BTreeMap<String, LockId> = self
            .locks
            .values()
            .map(|lock| (lock.name.clone(), lock.id.clone()))
            .collect();
        let ids: Vec<LockId> = self.locks.keys().cloned().collect();

        // Phase 1: child side.
        for id in &ids {
            let Some(lock) = self.locks.get(id) else {
                continue;
            };
            let dangling = lock
                .parent_id
                .as_ref()
                .is_some_and(|parent| parent == id || !self.locks.contains_key(parent));
            let wanted = lock
                .parent_name
                .as_ref()
                .and_then(|name| names.get(name))
                .filter(|parent| *parent != id)
                .cloned();
            let unresolved_name = lock.parent_name.is_some() && wanted.is_none();
            if lock.parent_name.as_deref() == Some(lock.name.as_str()) {
                warn!("Lock {} names itself as parent, ignoring", lock.name);
            }

            let Some(lock) = self.locks.get_mut(id) else {
                continue;
            };
            if dangling {
                debug!("Clearing dangling parent of {}", lock.name);
                lock.parent_id = None;
                report.cleared += 1;
            }
            if let Some(parent) = wanted
                && lock.parent_id.as_ref() != Some(&parent)
            {
                lock.parent_id = Some(parent);
                report.resolved += 1;
            } else if unresolved_name && lock.parent_id.is_none() {
                debug!(
                    "Parent {} of {} is not registered",
                    lock.parent_name.as_deref().unwrap_or_default(),
                    lock.name
                );
            }
        }

        // Phase 2: attach children to their parents.
        let links: Vec<(LockId, LockId)> = self
            .locks
            .values()
            .filter_map(|lock| lock.parent_id.clone().map(|parent| (parent, lock.id.clone())))
            .collect();
        for (parent, child) in links {
            if let Some(parent) = self.locks.get_mut(&parent)
                && !parent.child_ids.contains(&child)
            {
                parent.child_ids.push(child);
                report.attached += 1;
            }
        }

        // Phase 3: prune child ids that no longer point back.
        let back_links: BTreeMap<LockId, Option<LockId>> = self
            .locks
            .values()
            .map(|lock| (lock.id.clone(), lock.parent_id.clone()))
            .collect();
        for parent in self.locks.values_mut() {
            let parent_id = parent.id.clone();
            let before = parent.child_ids.len();
            let mut seen = Vec::with_capacity(before);
            parent.child_ids.retain(|child| {
                let points_back = back_links
                    .get(child)
                    .is_some_and(|p| p.as_ref() == Some(&parent_id));
                let keep = points_back && !seen.contains(child);
                if keep {
                    seen.push(child.clone());
                }
                keep
            });
            let pruned = before - parent.child_ids.len();
            if pruned > 0 {
                warn!("Pruned {} stale child link(s) from {}", pruned, parent.name);
                report.pruned += pruned;
            }
        }

        if report.changed() {
            debug!("Rebuilt lock links: {:?}", report);
        }
        report
    }
}
