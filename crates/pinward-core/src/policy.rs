//! Code slot policy engine.
//!
//! Decides whether a slot's code is currently authorized. The result is a
//! pure function of the slot and the local wall-clock time:
//!
//! ```text
//! active = enabled
//!        AND (count limit off   OR count > 0)
//!        AND (date range off    OR start <= now <= end)
//!        AND (day-of-week off   OR today's rule admits now)
//! ```
//!
//! # Time windows
//!
//! A day rule with `limit_by_time` admits `now` when its time of day falls
//! inside `[time_start, time_end]` (include mode) or outside it (exclude
//! mode). Both ends are inclusive. A window whose start is after its end
//! wraps past midnight. A zero-width window (`time_start == time_end`)
//! covers the whole day, so it always admits in include mode and never
//! admits in exclude mode. Missing bounds never admit.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use pinward_core::{CodeSlot, compute_active};
//!
//! let now = NaiveDate::from_ymd_opt(2024, 1, 1)
//!     .unwrap()
//!     .and_hms_opt(12, 0, 0)
//!     .unwrap();
//!
//! let mut slot = CodeSlot::new(1);
//! assert!(compute_active(&slot, now));
//!
//! slot.accesslimit_count_enabled = true;
//! slot.accesslimit_count = Some(0);
//! assert!(!compute_active(&slot, now));
//! ```

use crate::slot::{CodeSlot, DayOfWeekRule, WindowMode};
use chrono::{Datelike, NaiveDateTime, NaiveTime};
use std::fmt;

/// First constraint that keeps a slot from being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    Disabled,
    CountExhausted,
    OutsideDateRange,
    DayNotAllowed,
    OutsideTimeWindow,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InactiveReason::Disabled => "slot disabled",
            InactiveReason::CountExhausted => "no uses remaining",
            InactiveReason::OutsideDateRange => "outside date range",
            InactiveReason::DayNotAllowed => "day of week not allowed",
            InactiveReason::OutsideTimeWindow => "outside time window",
        };
        write!(f, "{}", reason)
    }
}

/// Whether `slot` is authorized at local time `now`.
pub fn compute_active(slot: &CodeSlot, now: NaiveDateTime) -> bool {
    explain_inactive(slot, now).is_none()
}

/// The first failing constraint, or `None` if the slot is active.
pub fn explain_inactive(slot: &CodeSlot, now: NaiveDateTime) -> Option<InactiveReason> {
    if !slot.enabled {
        return Some(InactiveReason::Disabled);
    }
    if !in_count_limit(slot) {
        return Some(InactiveReason::CountExhausted);
    }
    if !in_date_range(slot, now) {
        return Some(InactiveReason::OutsideDateRange);
    }
    if !slot.accesslimit_day_of_week_enabled {
        return None;
    }

    let today = now.weekday().num_days_from_monday() as u8;
    match slot.accesslimit_day_of_week.get(&today) {
        Some(rule) if rule.dow_enabled => {
            if admits_time(rule, now.time()) {
                None
            } else {
                Some(InactiveReason::OutsideTimeWindow)
            }
        }
        _ => Some(InactiveReason::DayNotAllowed),
    }
}

fn in_count_limit(slot: &CodeSlot) -> bool {
    !slot.accesslimit_count_enabled || slot.accesslimit_count.unwrap_or(0) > 0
}

fn in_date_range(slot: &CodeSlot, now: NaiveDateTime) -> bool {
    if !slot.accesslimit_date_range_enabled {
        return true;
    }
    match (
        slot.accesslimit_date_range_start,
        slot.accesslimit_date_range_end,
    ) {
        (Some(start), Some(end)) => start <= now && now <= end,
        _ => false,
    }
}

fn admits_time(rule: &DayOfWeekRule, time: NaiveTime) -> bool {
    if !rule.limit_by_time {
        return true;
    }
    let (Some(start), Some(end)) = (rule.time_start, rule.time_end) else {
        return false;
    };
    let inside = in_window(time, start, end);
    match rule.include_exclude {
        WindowMode::Include => inside,
        WindowMode::Exclude => !inside,
    }
}

fn in_window(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        true
    } else if start < end {
        start <= time && time <= end
    } else {
        time >= start || time <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    // 2024-01-01 is a Monday.
    fn monday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Slot with every constraint enabled and satisfied at Monday noon.
    fn fully_constrained() -> CodeSlot {
        let mut slot = CodeSlot::new(1);
        slot.accesslimit_count_enabled = true;
        slot.accesslimit_count = Some(3);
        slot.accesslimit_date_range_enabled = true;
        slot.accesslimit_date_range_start = Some(monday_at(0, 0) - chrono::Duration::days(1));
        slot.accesslimit_date_range_end = Some(monday_at(0, 0) + chrono::Duration::days(1));
        slot.accesslimit_day_of_week_enabled = true;
        let monday = slot.accesslimit_day_of_week.get_mut(&0).unwrap();
        *monday = DayOfWeekRule::new(0).with_window(WindowMode::Include, t(9, 0), t(17, 0));
        slot
    }

    #[test]
    fn test_unconstrained_enabled_slot_is_active() {
        assert!(compute_active(&CodeSlot::new(1), monday_at(3, 0)));
    }

    #[test]
    fn test_all_constraints_pass() {
        assert!(compute_active(&fully_constrained(), monday_at(12, 0)));
    }

    #[rstest]
    #[case::disabled(|s: &mut CodeSlot| s.enabled = false, InactiveReason::Disabled)]
    #[case::count_zero(|s: &mut CodeSlot| s.accesslimit_count = Some(0), InactiveReason::CountExhausted)]
    #[case::count_missing(|s: &mut CodeSlot| s.accesslimit_count = None, InactiveReason::CountExhausted)]
    #[case::date_expired(
        |s: &mut CodeSlot| s.accesslimit_date_range_end = Some(monday_at(11, 0)),
        InactiveReason::OutsideDateRange
    )]
    #[case::date_missing(
        |s: &mut CodeSlot| s.accesslimit_date_range_start = None,
        InactiveReason::OutsideDateRange
    )]
    #[case::dow_disabled(
        |s: &mut CodeSlot| s.accesslimit_day_of_week.get_mut(&0).unwrap().dow_enabled = false,
        InactiveReason::DayNotAllowed
    )]
    #[case::dow_missing(
        |s: &mut CodeSlot| { s.accesslimit_day_of_week.remove(&0); },
        InactiveReason::DayNotAllowed
    )]
    #[case::outside_window(
        |s: &mut CodeSlot| s.accesslimit_day_of_week.get_mut(&0).unwrap().time_end = Some(t(11, 0)),
        InactiveReason::OutsideTimeWindow
    )]
    #[case::exclude_window(
        |s: &mut CodeSlot| s.accesslimit_day_of_week.get_mut(&0).unwrap().include_exclude = WindowMode::Exclude,
        InactiveReason::OutsideTimeWindow
    )]
    fn test_single_violation_deactivates(
        #[case] violate: fn(&mut CodeSlot),
        #[case] reason: InactiveReason,
    ) {
        let mut slot = fully_constrained();
        violate(&mut slot);
        assert_eq!(explain_inactive(&slot, monday_at(12, 0)), Some(reason));
        assert!(!compute_active(&slot, monday_at(12, 0)));
    }

    #[rstest]
    #[case(t(9, 0), true)]
    #[case(t(17, 0), true)]
    #[case(t(8, 59), false)]
    #[case(t(17, 1), false)]
    fn test_include_window_is_inclusive(#[case] time: NaiveTime, #[case] expected: bool) {
        let slot = fully_constrained();
        let now = monday_at(0, 0).date().and_time(time);
        assert_eq!(compute_active(&slot, now), expected);
    }

    #[rstest]
    #[case(23, 30, true)]
    #[case(2, 0, true)]
    #[case(12, 0, false)]
    fn test_window_wraps_midnight(#[case] h: u32, #[case] m: u32, #[case] expected: bool) {
        let mut slot = CodeSlot::new(1);
        slot.accesslimit_day_of_week_enabled = true;
        let rule = slot.accesslimit_day_of_week.get_mut(&0).unwrap();
        *rule = DayOfWeekRule::new(0).with_window(WindowMode::Include, t(22, 0), t(6, 0));
        assert_eq!(compute_active(&slot, monday_at(h, m)), expected);
    }

    #[rstest]
    #[case(WindowMode::Include, true)]
    #[case(WindowMode::Exclude, false)]
    fn test_zero_width_window(#[case] mode: WindowMode, #[case] expected: bool) {
        let mut slot = CodeSlot::new(1);
        slot.accesslimit_day_of_week_enabled = true;
        let rule = slot.accesslimit_day_of_week.get_mut(&0).unwrap();
        *rule = DayOfWeekRule::new(0).with_window(mode, t(8, 0), t(8, 0));
        for hour in [0, 8, 15, 23] {
            assert_eq!(compute_active(&slot, monday_at(hour, 0)), expected);
        }
    }

    #[test]
    fn test_missing_window_bounds_never_admit() {
        for mode in [WindowMode::Include, WindowMode::Exclude] {
            let mut slot = CodeSlot::new(1);
            slot.accesslimit_day_of_week_enabled = true;
            let rule = slot.accesslimit_day_of_week.get_mut(&0).unwrap();
            rule.limit_by_time = true;
            rule.include_exclude = mode;
            rule.time_start = Some(t(9, 0));
            assert!(!compute_active(&slot, monday_at(12, 0)));
        }
    }

    #[test]
    fn test_other_days_are_ignored() {
        let mut slot = CodeSlot::new(1);
        slot.accesslimit_day_of_week_enabled = true;
        slot.accesslimit_day_of_week.get_mut(&1).unwrap().dow_enabled = false;
        assert!(compute_active(&slot, monday_at(12, 0)));
        assert!(!compute_active(&slot, monday_at(12, 0) + chrono::Duration::days(1)));
    }

    #[rstest]
    #[case(InactiveReason::Disabled, "slot disabled")]
    #[case(InactiveReason::OutsideDateRange, "outside date range")]
    #[case(InactiveReason::OutsideTimeWindow, "outside time window")]
    fn test_inactive_reason_display(#[case] reason: InactiveReason, #[case] expected: &str) {
        assert_eq!(reason.to_string(), expected);
    }

    #[test]
    fn test_active_implies_enabled() {
        let mut slot = fully_constrained();
        slot.enabled = false;
        for hour in 0..24 {
            assert!(!compute_active(&slot, monday_at(hour, 0)));
        }
    }
}
