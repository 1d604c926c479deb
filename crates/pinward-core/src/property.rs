//! Typed addressing of editable lock and slot fields.
//!
//! UI bindings address fields with dotted paths such as
//! `code_slots:1.accesslimit_day_of_week:3.dow_enabled`. Paths are parsed once
//! into a [`PropertyPath`] and applied with a typed [`PropertyValue`]; no
//! string splitting happens when a value is written.
//!
//! ```text
//! autolock_min_day                                  -> Lock(AutolockMinDay)
//! code_slots:2.enabled                              -> Slot { 2, Enabled }
//! code_slots:2.accesslimit_day_of_week:6.time_start -> DayOfWeek { 2, 6, TimeStart }
//! ```
//!
//! An optional entity-domain prefix (`switch.`, `number.`, ...) is accepted
//! and ignored.

use crate::constants::DAYS_PER_WEEK;
use crate::error::{Error, Result};
use crate::lock::Lock;
use crate::slot::{CodeSlot, DayOfWeekRule, WindowMode};
use crate::types::Pin;
use chrono::{NaiveDateTime, NaiveTime};
use std::fmt;

const ENTITY_DOMAINS: &[&str] = &[
    "binary_sensor",
    "button",
    "datetime",
    "number",
    "select",
    "sensor",
    "switch",
    "text",
    "time",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockField {
    AutolockEnabled,
    AutolockMinDay,
    AutolockMinNight,
    RetryLock,
    LockNotifications,
    DoorNotifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotField {
    Name,
    Pin,
    Enabled,
    OverrideParent,
    Notifications,
    AccesslimitCountEnabled,
    AccesslimitCount,
    AccesslimitDateRangeEnabled,
    AccesslimitDateRangeStart,
    AccesslimitDateRangeEnd,
    AccesslimitDayOfWeekEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayField {
    DowEnabled,
    LimitByTime,
    IncludeExclude,
    TimeStart,
    TimeEnd,
}

/// Parsed address of one editable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyPath {
    Lock(LockField),
    Slot { slot: u16, field: SlotField },
    DayOfWeek { slot: u16, day: u8, field: DayField },
}

/// Value written to a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(u32),
    Text(String),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Clears an optional field.
    Empty,
}

impl LockField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "autolock_enabled" => Self::AutolockEnabled,
            "autolock_min_day" => Self::AutolockMinDay,
            "autolock_min_night" => Self::AutolockMinNight,
            "retry_lock" => Self::RetryLock,
            "lock_notifications" => Self::LockNotifications,
            "door_notifications" => Self::DoorNotifications,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::AutolockEnabled => "autolock_enabled",
            Self::AutolockMinDay => "autolock_min_day",
            Self::AutolockMinNight => "autolock_min_night",
            Self::RetryLock => "retry_lock",
            Self::LockNotifications => "lock_notifications",
            Self::DoorNotifications => "door_notifications",
        }
    }
}

impl SlotField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "name" => Self::Name,
            "pin" => Self::Pin,
            "enabled" => Self::Enabled,
            "override_parent" => Self::OverrideParent,
            "notifications" => Self::Notifications,
            "accesslimit_count_enabled" => Self::AccesslimitCountEnabled,
            "accesslimit_count" => Self::AccesslimitCount,
            "accesslimit_date_range_enabled" => Self::AccesslimitDateRangeEnabled,
            "accesslimit_date_range_start" => Self::AccesslimitDateRangeStart,
            "accesslimit_date_range_end" => Self::AccesslimitDateRangeEnd,
            "accesslimit_day_of_week_enabled" => Self::AccesslimitDayOfWeekEnabled,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Pin => "pin",
            Self::Enabled => "enabled",
            Self::OverrideParent => "override_parent",
            Self::Notifications => "notifications",
            Self::AccesslimitCountEnabled => "accesslimit_count_enabled",
            Self::AccesslimitCount => "accesslimit_count",
            Self::AccesslimitDateRangeEnabled => "accesslimit_date_range_enabled",
            Self::AccesslimitDateRangeStart => "accesslimit_date_range_start",
            Self::AccesslimitDateRangeEnd => "accesslimit_date_range_end",
            Self::AccesslimitDayOfWeekEnabled => "accesslimit_day_of_week_enabled",
        }
    }
}

impl DayField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "dow_enabled" => Self::DowEnabled,
            "limit_by_time" => Self::LimitByTime,
            "include_exclude" => Self::IncludeExclude,
            "time_start" => Self::TimeStart,
            "time_end" => Self::TimeEnd,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::DowEnabled => "dow_enabled",
            Self::LimitByTime => "limit_by_time",
            Self::IncludeExclude => "include_exclude",
            Self::TimeStart => "time_start",
            Self::TimeEnd => "time_end",
        }
    }
}

impl PropertyPath {
    /// Parse a dotted property path.
    ///
    /// # Errors
    /// Returns `Error::InvalidPropertyPath` for unknown fields, malformed
    /// indices or out-of-range day numbers.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPropertyPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments: Vec<&str> = path.split('.').collect();
        if segments.len() > 1 && ENTITY_DOMAINS.contains(&segments[0]) {
            segments.remove(0);
        }

        match segments.as_slice() {
            [field] => LockField::parse(field)
                .map(PropertyPath::Lock)
                .ok_or_else(|| invalid("unknown lock field")),
            [slot, field] => {
                let slot = indexed(slot, "code_slots").ok_or_else(|| invalid("bad slot index"))?;
                let field = SlotField::parse(field).ok_or_else(|| invalid("unknown slot field"))?;
                Ok(PropertyPath::Slot { slot, field })
            }
            [slot, day, field] => {
                let slot = indexed(slot, "code_slots").ok_or_else(|| invalid("bad slot index"))?;
                let day: u8 = indexed(day, "accesslimit_day_of_week")
                    .and_then(|d| u8::try_from(d).ok())
                    .filter(|d| *d < DAYS_PER_WEEK)
                    .ok_or_else(|| invalid("bad day of week"))?;
                let field = DayField::parse(field).ok_or_else(|| invalid("unknown day field"))?;
                Ok(PropertyPath::DayOfWeek { slot, day, field })
            }
            _ => Err(invalid("wrong number of segments")),
        }
    }

    /// Slot number addressed by this path, if any.
    pub fn slot(&self) -> Option<u16> {
        match self {
            PropertyPath::Lock(_) => None,
            PropertyPath::Slot { slot, .. } | PropertyPath::DayOfWeek { slot, .. } => Some(*slot),
        }
    }

    /// Write `value` into `lock`.
    ///
    /// Slot fields of a slot that mirrors its parent are read-only, apart from
    /// `override_parent` itself. The derived `active` flag is not recomputed
    /// here.
    pub fn apply(&self, lock: &mut Lock, value: PropertyValue) -> Result<()> {
        match *self {
            PropertyPath::Lock(field) => apply_lock(lock, field, value),
            PropertyPath::Slot { slot, field } => {
                if field != SlotField::OverrideParent && lock.slot_mirrors_parent(slot) {
                    return Err(Error::SlotMirrorsParent {
                        lock: lock.name.clone(),
                        slot,
                    });
                }
                let code_slot = slot_mut(lock, slot)?;
                apply_slot(code_slot, field, value)
            }
            PropertyPath::DayOfWeek { slot, day, field } => {
                if lock.slot_mirrors_parent(slot) {
                    return Err(Error::SlotMirrorsParent {
                        lock: lock.name.clone(),
                        slot,
                    });
                }
                let code_slot = slot_mut(lock, slot)?;
                let rule = code_slot
                    .accesslimit_day_of_week
                    .entry(day)
                    .or_insert_with(|| DayOfWeekRule::new(day));
                apply_day(rule, field, value)
            }
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyPath::Lock(field) => write!(f, "{}", field.as_str()),
            PropertyPath::Slot { slot, field } => {
                write!(f, "code_slots:{}.{}", slot, field.as_str())
            }
            PropertyPath::DayOfWeek { slot, day, field } => write!(
                f,
                "code_slots:{}.accesslimit_day_of_week:{}.{}",
                slot,
                day,
                field.as_str()
            ),
        }
    }
}

impl std::str::FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PropertyPath::parse(s)
    }
}

fn indexed(segment: &str, prefix: &str) -> Option<u16> {
    let (name, index) = segment.split_once(':')?;
    if name != prefix {
        return None;
    }
    index.parse().ok()
}

fn slot_mut(lock: &mut Lock, slot: u16) -> Result<&mut CodeSlot> {
    let lock_name = lock.name.clone();
    lock.slot_mut(slot).ok_or(Error::SlotNotFound {
        lock: lock_name,
        slot,
    })
}

fn mismatch(field: &str, expected: &str) -> Error {
    Error::PropertyTypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

fn as_bool(field: &str, value: PropertyValue) -> Result<bool> {
    match value {
        PropertyValue::Bool(b) => Ok(b),
        _ => Err(mismatch(field, "bool")),
    }
}

fn as_optional_number(field: &str, value: PropertyValue) -> Result<Option<u32>> {
    match value {
        PropertyValue::Number(n) => Ok(Some(n)),
        PropertyValue::Empty => Ok(None),
        _ => Err(mismatch(field, "number")),
    }
}

fn as_optional_datetime(field: &str, value: PropertyValue) -> Result<Option<NaiveDateTime>> {
    match value {
        PropertyValue::DateTime(dt) => Ok(Some(dt)),
        PropertyValue::Empty => Ok(None),
        _ => Err(mismatch(field, "datetime")),
    }
}

fn as_optional_time(field: &str, value: PropertyValue) -> Result<Option<NaiveTime>> {
    match value {
        PropertyValue::Time(t) => Ok(Some(t)),
        PropertyValue::Empty => Ok(None),
        _ => Err(mismatch(field, "time")),
    }
}

fn apply_lock(lock: &mut Lock, field: LockField, value: PropertyValue) -> Result<()> {
    let name = field.as_str();
    match field {
        LockField::AutolockEnabled => lock.autolock_enabled = as_bool(name, value)?,
        LockField::AutolockMinDay => lock.autolock_min_day = as_optional_number(name, value)?,
        LockField::AutolockMinNight => lock.autolock_min_night = as_optional_number(name, value)?,
        LockField::RetryLock => lock.retry_lock = as_bool(name, value)?,
        LockField::LockNotifications => lock.lock_notifications = as_bool(name, value)?,
        LockField::DoorNotifications => lock.door_notifications = as_bool(name, value)?,
    }
    Ok(())
}

fn apply_slot(slot: &mut CodeSlot, field: SlotField, value: PropertyValue) -> Result<()> {
    let name = field.as_str();
    match field {
        SlotField::Name => {
            slot.name = match value {
                PropertyValue::Text(text) if !text.is_empty() => Some(text),
                PropertyValue::Text(_) | PropertyValue::Empty => None,
                _ => return Err(mismatch(name, "text")),
            }
        }
        SlotField::Pin => {
            slot.pin = match value {
                PropertyValue::Text(text) if !text.is_empty() => Some(Pin::new(&text)?),
                PropertyValue::Text(_) | PropertyValue::Empty => None,
                _ => return Err(mismatch(name, "text")),
            };
            slot.pin_masked = false;
        }
        SlotField::Enabled => slot.enabled = as_bool(name, value)?,
        SlotField::OverrideParent => slot.override_parent = as_bool(name, value)?,
        SlotField::Notifications => slot.notifications = as_bool(name, value)?,
        SlotField::AccesslimitCountEnabled => {
            slot.accesslimit_count_enabled = as_bool(name, value)?
        }
        SlotField::AccesslimitCount => slot.accesslimit_count = as_optional_number(name, value)?,
        SlotField::AccesslimitDateRangeEnabled => {
            slot.accesslimit_date_range_enabled = as_bool(name, value)?
        }
        SlotField::AccesslimitDateRangeStart => {
            slot.accesslimit_date_range_start = as_optional_datetime(name, value)?
        }
        SlotField::AccesslimitDateRangeEnd => {
            slot.accesslimit_date_range_end = as_optional_datetime(name, value)?
        }
        SlotField::AccesslimitDayOfWeekEnabled => {
            slot.accesslimit_day_of_week_enabled = as_bool(name, value)?
        }
    }
    Ok(())
}

fn apply_day(rule: &mut DayOfWeekRule, field: DayField, value: PropertyValue) -> Result<()> {
    let name = field.as_str();
    match field {
        DayField::DowEnabled => rule.dow_enabled = as_bool(name, value)?,
        DayField::LimitByTime => rule.limit_by_time = as_bool(name, value)?,
        // `true` selects an allow-window, `false` a deny-window.
        DayField::IncludeExclude => {
            rule.include_exclude = if as_bool(name, value)? {
                WindowMode::Include
            } else {
                WindowMode::Exclude
            }
        }
        DayField::TimeStart => rule.time_start = as_optional_time(name, value)?,
        DayField::TimeEnd => rule.time_end = as_optional_time(name, value)?,
    }
    Ok(())
}
