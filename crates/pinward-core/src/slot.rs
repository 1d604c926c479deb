//! Code slots and their access-limit configuration.
//!
//! A [`CodeSlot`] is one numbered PIN storage location on a lock. Besides the
//! PIN itself it carries the user's intent (`enabled`), the derived
//! authorization flag (`active`) and the access limits the
//! [`policy`](crate::policy) engine evaluates:
//!
//! ```text
//! CodeSlot
//! ├── accesslimit_count        uses remaining
//! ├── accesslimit_date_range   [start, end]
//! └── accesslimit_day_of_week  7 x DayOfWeekRule
//!     └── time window          include (allow) or exclude (deny)
//! ```

use crate::constants::DAYS_PER_WEEK;
use crate::types::{Pin, SyncStatus};
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a day-of-week time window allows or denies access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Access is allowed only inside the window.
    #[default]
    Include,
    /// Access is allowed only outside the window.
    Exclude,
}

/// Access rule for one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOfWeekRule {
    /// Day number, Monday = 0 through Sunday = 6.
    pub day_of_week_num: u8,
    pub dow_enabled: bool,
    pub limit_by_time: bool,
    pub include_exclude: WindowMode,
    pub time_start: Option<NaiveTime>,
    pub time_end: Option<NaiveTime>,
}

impl DayOfWeekRule {
    /// Rule that allows the whole day.
    pub fn new(day_of_week_num: u8) -> Self {
        Self {
            day_of_week_num,
            dow_enabled: true,
            limit_by_time: false,
            include_exclude: WindowMode::Include,
            time_start: None,
            time_end: None,
        }
    }

    /// Restrict the rule to a time window.
    pub fn with_window(mut self, mode: WindowMode, start: NaiveTime, end: NaiveTime) -> Self {
        self.limit_by_time = true;
        self.include_exclude = mode;
        self.time_start = Some(start);
        self.time_end = Some(end);
        self
    }

    /// Copy the configurable fields of another rule, keeping the day number.
    pub fn copy_settings_from(&mut self, other: &DayOfWeekRule) {
        self.dow_enabled = other.dow_enabled;
        self.limit_by_time = other.limit_by_time;
        self.include_exclude = other.include_exclude;
        self.time_start = other.time_start;
        self.time_end = other.time_end;
    }
}

/// Full set of seven allow-all day rules.
pub fn default_week() -> BTreeMap<u8, DayOfWeekRule> {
    (0..DAYS_PER_WEEK)
        .map(|day| (day, DayOfWeekRule::new(day)))
        .collect()
}

/// One PIN slot on a lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSlot {
    pub number: u16,
    pub name: Option<String>,
    /// Programmed code; `None` means no code is programmed.
    pub pin: Option<Pin>,
    /// The lock last reported this slot as masked, so the programmed code
    /// is unknown. Never set together with a fresh `pin` reading.
    #[serde(default)]
    pub pin_masked: bool,
    pub enabled: bool,
    /// Derived by [`compute_active`](crate::policy::compute_active).
    pub active: bool,
    /// On a child lock, the slot is managed independently of the parent.
    pub override_parent: bool,
    pub notifications: bool,
    #[serde(default)]
    pub synced: SyncStatus,

    pub accesslimit_count_enabled: bool,
    pub accesslimit_count: Option<u32>,

    pub accesslimit_date_range_enabled: bool,
    pub accesslimit_date_range_start: Option<NaiveDateTime>,
    pub accesslimit_date_range_end: Option<NaiveDateTime>,

    pub accesslimit_day_of_week_enabled: bool,
    #[serde(default = "default_week")]
    pub accesslimit_day_of_week: BTreeMap<u8, DayOfWeekRule>,
}

impl CodeSlot {
    /// Create an empty, enabled slot with no access limits.
    pub fn new(number: u16) -> Self {
        Self {
            number,
            name: None,
            pin: None,
            pin_masked: false,
            enabled: true,
            active: true,
            override_parent: false,
            notifications: false,
            synced: SyncStatus::Disconnected,
            accesslimit_count_enabled: false,
            accesslimit_count: None,
            accesslimit_date_range_enabled: false,
            accesslimit_date_range_start: None,
            accesslimit_date_range_end: None,
            accesslimit_day_of_week_enabled: false,
            accesslimit_day_of_week: default_week(),
        }
    }

    /// Builder-style PIN setter.
    pub fn with_pin(mut self, pin: Pin) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether a usable code is programmed.
    pub fn has_pin(&self) -> bool {
        self.pin.is_some()
    }

    /// Copy every user-editable policy field from `other`.
    ///
    /// The PIN, the derived `active` flag and the sync status are left alone.
    /// Used when a lock's configuration is replaced and the slot survives.
    pub fn copy_policy_from(&mut self, other: &CodeSlot) {
        self.enabled = other.enabled;
        self.name = other.name.clone();
        self.override_parent = other.override_parent;
        self.notifications = other.notifications;
        self.copy_access_limits_from(other);
    }

    /// Copy the access-limit configuration from `other`.
    pub fn copy_access_limits_from(&mut self, other: &CodeSlot) {
        self.accesslimit_count_enabled = other.accesslimit_count_enabled;
        self.accesslimit_count = other.accesslimit_count;
        self.accesslimit_date_range_enabled = other.accesslimit_date_range_enabled;
        self.accesslimit_date_range_start = other.accesslimit_date_range_start;
        self.accesslimit_date_range_end = other.accesslimit_date_range_end;
        self.accesslimit_day_of_week_enabled = other.accesslimit_day_of_week_enabled;
        for (day, rule) in &other.accesslimit_day_of_week {
            self.accesslimit_day_of_week
                .entry(*day)
                .or_insert_with(|| DayOfWeekRule::new(*day))
                .copy_settings_from(rule);
        }
    }

    /// Consume one use from the access counter, if counting is enabled.
    ///
    /// Returns the remaining count when a use was consumed.
    pub fn consume_access(&mut self) -> Option<u32> {
        if !self.accesslimit_count_enabled {
            return None;
        }
        match self.accesslimit_count {
            Some(count) if count > 0 => {
                self.accesslimit_count = Some(count - 1);
                self.accesslimit_count
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_has_full_week() {
        let slot = CodeSlot::new(3);
        assert_eq!(slot.accesslimit_day_of_week.len(), 7);
        assert!(slot.accesslimit_day_of_week.values().all(|r| r.dow_enabled));
        assert!(slot.enabled && slot.active && !slot.has_pin());
    }

    #[test]
    fn test_consume_access() {
        let mut slot = CodeSlot::new(1);
        assert_eq!(slot.consume_access(), None);

        slot.accesslimit_count_enabled = true;
        slot.accesslimit_count = Some(2);
        assert_eq!(slot.consume_access(), Some(1));
        assert_eq!(slot.consume_access(), Some(0));
        assert_eq!(slot.consume_access(), None);
        assert_eq!(slot.accesslimit_count, Some(0));
    }

    #[test]
    fn test_copy_policy_keeps_pin() {
        let mut source = CodeSlot::new(1).with_name("Guest");
        source.enabled = false;
        source.accesslimit_count_enabled = true;
        source.accesslimit_count = Some(4);
        source.accesslimit_day_of_week.get_mut(&2).unwrap().dow_enabled = false;

        let mut target = CodeSlot::new(1).with_pin(Pin::new("1234").unwrap());
        target.copy_policy_from(&source);

        assert_eq!(target.name.as_deref(), Some("Guest"));
        assert!(!target.enabled);
        assert_eq!(target.accesslimit_count, Some(4));
        assert!(!target.accesslimit_day_of_week[&2].dow_enabled);
        assert_eq!(target.pin, Some(Pin::new("1234").unwrap()));
    }
}
