use crate::constants::{DEFAULT_AUTOLOCK_MIN_DAY, DEFAULT_AUTOLOCK_MIN_NIGHT};
use crate::slot::CodeSlot;
use crate::types::{DoorState, LockId, LockState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A configured door lock and its code slots.
///
/// `child_ids` is a derived list maintained by the relationship graph; the
/// authoritative link is a child's `parent_id` (or, before the first
/// rebuild, its `parent_name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    pub name: String,
    /// Provider platform identifier, e.g. `"mock"`.
    pub platform: String,

    pub parent_name: Option<String>,
    pub parent_id: Option<LockId>,
    pub child_ids: Vec<LockId>,

    pub connected: bool,
    pub lock_state: LockState,
    pub door_state: DoorState,

    pub autolock_enabled: bool,
    pub autolock_min_day: Option<u32>,
    pub autolock_min_night: Option<u32>,
    /// When autolock fires with the door open, wait for it to close.
    pub retry_lock: bool,
    pub pending_retry_lock: bool,

    pub lock_notifications: bool,
    pub door_notifications: bool,

    pub code_slots: BTreeMap<u16, CodeSlot>,
}

impl Lock {
    /// Create a lock with no slots.
    pub fn new(id: LockId, name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            platform: platform.into(),
            parent_name: None,
            parent_id: None,
            child_ids: Vec::new(),
            connected: false,
            lock_state: LockState::Unknown,
            door_state: DoorState::Unknown,
            autolock_enabled: false,
            autolock_min_day: None,
            autolock_min_night: None,
            retry_lock: false,
            pending_retry_lock: false,
            lock_notifications: false,
            door_notifications: false,
            code_slots: BTreeMap::new(),
        }
    }

    /// Add `count` empty slots starting at `start`.
    pub fn with_slots(mut self, start: u16, count: u16) -> Self {
        for number in start..start.saturating_add(count) {
            self.code_slots.insert(number, CodeSlot::new(number));
        }
        self
    }

    /// Declare a parent by name; resolved to an id by the next rebuild.
    pub fn with_parent_name(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn slot(&self, number: u16) -> Option<&CodeSlot> {
        self.code_slots.get(&number)
    }

    pub fn slot_mut(&mut self, number: u16) -> Option<&mut CodeSlot> {
        self.code_slots.get_mut(&number)
    }

    /// Whether slot `number` follows the parent lock.
    pub fn slot_mirrors_parent(&self, number: u16) -> bool {
        self.is_child()
            && self
                .code_slots
                .get(&number)
                .is_some_and(|slot| !slot.override_parent)
    }

    /// Daytime autolock delay in minutes, falling back to the default.
    pub fn autolock_day_minutes(&self) -> u32 {
        self.autolock_min_day.unwrap_or(DEFAULT_AUTOLOCK_MIN_DAY)
    }

    /// Night autolock delay in minutes, falling back to the default.
    pub fn autolock_night_minutes(&self) -> u32 {
        self.autolock_min_night.unwrap_or(DEFAULT_AUTOLOCK_MIN_NIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(name: &str) -> Lock {
        Lock::new(LockId::new(name).unwrap(), name, "mock")
    }

    #[test]
    fn test_with_slots() {
        let lock = lock("front").with_slots(10, 3);
        let numbers: Vec<u16> = lock.code_slots.keys().copied().collect();
        assert_eq!(numbers, vec![10, 11, 12]);
    }

    #[test]
    fn test_slot_mirrors_parent_only_on_child() {
        let mut lock = lock("side").with_slots(1, 2);
        assert!(!lock.slot_mirrors_parent(1));

        lock.parent_id = Some(LockId::new("front").unwrap());
        assert!(lock.slot_mirrors_parent(1));

        lock.slot_mut(2).unwrap().override_parent = true;
        assert!(!lock.slot_mirrors_parent(2));
        assert!(!lock.slot_mirrors_parent(99));
    }

    #[test]
    fn test_autolock_defaults() {
        let mut lock = lock("front");
        assert_eq!(lock.autolock_day_minutes(), DEFAULT_AUTOLOCK_MIN_DAY);
        assert_eq!(lock.autolock_night_minutes(), DEFAULT_AUTOLOCK_MIN_NIGHT);
        lock.autolock_min_night = Some(1);
        assert_eq!(lock.autolock_night_minutes(), 1);
    }
}
