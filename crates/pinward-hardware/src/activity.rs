//! Lock activity table.
//!
//! Locks report what just happened as a numeric code. Depending on the
//! model, the code arrives as an *alarm type* sensor value (older
//! firmware), an *access control* sensor value, or an access-control
//! notification event (which uses the access control numbering).
//!
//! | Activity       | Action   | Method | alarm_type | access_control |
//! |----------------|----------|--------|------------|----------------|
//! | Manual Lock    | locked   | manual | 21         | 1              |
//! | Manual Unlock  | unlocked | manual | 22         | 2              |
//! | RF Lock        | locked   | rf     | 24         | 3              |
//! | RF Unlock      | unlocked | rf     | 25         | 4              |
//! | Keypad Lock    | locked   | keypad | 18         | 5              |
//! | Keypad Unlock  | unlocked | keypad | 19         | 6              |
//! | Auto Lock      | locked   | auto   | 27         | 9              |
//!
//! The full table also lists jams, battery and code management reports.

use pinward_core::LockState;
use serde::{Deserialize, Serialize};

/// What a reported activity did to the bolt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Locked,
    Unlocked,
    Jammed,
    /// Informational report with no bolt movement.
    None,
}

impl LockAction {
    /// Lock state this action leads to, if it moves the bolt.
    pub fn target_state(self) -> Option<LockState> {
        match self {
            LockAction::Locked => Some(LockState::Locked),
            LockAction::Unlocked => Some(LockState::Unlocked),
            LockAction::Jammed | LockAction::None => None,
        }
    }
}

/// How an activity was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMethod {
    Manual,
    Rf,
    Keypad,
    Auto,
    Unknown,
}

/// Which numbering a lock's activity sensor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    AlarmType,
    AccessControl,
}

/// One row of the activity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub name: &'static str,
    pub action: LockAction,
    pub method: LockMethod,
    pub alarm_type: Option<u16>,
    pub access_control: Option<u16>,
}

impl Activity {
    /// Whether the activity was triggered by a code typed on the keypad.
    pub fn is_keypad(&self) -> bool {
        self.method == LockMethod::Keypad
    }

    /// Code reported for this activity by a sensor of `kind`.
    pub fn code(&self, kind: SensorKind) -> Option<u16> {
        match kind {
            SensorKind::AlarmType => self.alarm_type,
            SensorKind::AccessControl => self.access_control,
        }
    }
}

const fn row(
    name: &'static str,
    action: LockAction,
    method: LockMethod,
    alarm_type: Option<u16>,
    access_control: Option<u16>,
) -> Activity {
    Activity {
        name,
        action,
        method,
        alarm_type,
        access_control,
    }
}

use LockAction as A;
use LockMethod as M;

/// All known activities.
pub const ACTIVITIES: &[Activity] = &[
    row("Lock Jammed", A::Jammed, M::Unknown, Some(9), Some(11)),
    row("Keypad Lock Jammed", A::Jammed, M::Keypad, Some(17), None),
    row("Manual Lock", A::Locked, M::Manual, Some(21), Some(1)),
    row("Manual Unlock", A::Unlocked, M::Manual, Some(22), Some(2)),
    row("RF Lock Jammed", A::Jammed, M::Rf, Some(23), Some(8)),
    row("RF Lock", A::Locked, M::Rf, Some(24), Some(3)),
    row("RF Unlock", A::Unlocked, M::Rf, Some(25), Some(4)),
    row("Auto Lock Jammed", A::Jammed, M::Auto, Some(26), Some(10)),
    row("Auto Lock", A::Locked, M::Auto, Some(27), Some(9)),
    row("All User Codes Deleted", A::None, M::Unknown, Some(32), Some(12)),
    row("Bad Code Entered", A::None, M::Keypad, Some(161), None),
    row("Battery Low", A::None, M::Unknown, Some(167), None),
    row("Battery Critical", A::None, M::Unknown, Some(168), None),
    row("Battery Too Low To Operate Lock", A::None, M::Unknown, Some(169), None),
    row("Keypad Action", A::None, M::Keypad, Some(16), None),
    row("Keypad Lock", A::Locked, M::Keypad, Some(18), Some(5)),
    row("Keypad Unlock", A::Unlocked, M::Keypad, Some(19), Some(6)),
    row("User Code Attempt Outside of Schedule", A::None, M::Keypad, Some(162), None),
    row("User Code Deleted", A::None, M::Keypad, Some(33), Some(13)),
    row("User Code Changed", A::None, M::Keypad, Some(112), None),
    row("Duplicate User Code", A::None, M::Keypad, Some(113), Some(15)),
    row("No Status Reported", A::None, M::Unknown, Some(0), None),
    row("Manual Lock Jammed", A::Jammed, M::Manual, None, Some(7)),
    row("Keypad Temporarily Disabled", A::None, M::Keypad, None, Some(16)),
    row("Keypad Busy", A::None, M::Keypad, None, Some(17)),
    row("New User Code Added", A::None, M::Keypad, None, Some(14)),
    row("New Program Code Entered", A::None, M::Keypad, None, Some(18)),
];

/// Label used when a code is not in the table.
pub const UNKNOWN_ACTIVITY: &str = "Unknown Lock Event";

/// Look up an activity reported by a sensor of `kind`.
pub fn by_sensor(kind: SensorKind, code: u16) -> Option<&'static Activity> {
    ACTIVITIES.iter().find(|a| a.code(kind) == Some(code))
}

/// Look up an access-control notification event.
pub fn by_notification(event_code: u16) -> Option<&'static Activity> {
    by_sensor(SensorKind::AccessControl, event_code)
}

/// Sensor value implied by a bolt state when the sensor itself is stale.
///
/// A lock that is operated remotely often leaves its activity sensor
/// untouched, so a state change without a fresh sensor reading is reported
/// as an RF lock or unlock.
pub fn inferred_code(kind: SensorKind, state: LockState) -> Option<u16> {
    match (kind, state) {
        (SensorKind::AlarmType, LockState::Locked) => Some(24),
        (SensorKind::AlarmType, LockState::Unlocked) => Some(25),
        (SensorKind::AccessControl, LockState::Locked) => Some(3),
        (SensorKind::AccessControl, LockState::Unlocked) => Some(4),
        (_, LockState::Unknown) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypad_unlock_both_numberings() {
        let a = by_sensor(SensorKind::AlarmType, 19).unwrap();
        let b = by_notification(6).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "Keypad Unlock");
        assert!(a.is_keypad());
        assert_eq!(a.action.target_state(), Some(LockState::Unlocked));
    }

    #[test]
    fn test_jam_has_no_target_state() {
        let jam = by_notification(11).unwrap();
        assert_eq!(jam.name, "Lock Jammed");
        assert_eq!(jam.action.target_state(), None);
    }

    #[test]
    fn test_unknown_code() {
        assert!(by_sensor(SensorKind::AlarmType, 250).is_none());
        assert!(by_notification(99).is_none());
    }

    #[test]
    fn test_inferred_codes_are_rf_actions() {
        for kind in [SensorKind::AlarmType, SensorKind::AccessControl] {
            for state in [LockState::Locked, LockState::Unlocked] {
                let code = inferred_code(kind, state).unwrap();
                let activity = by_sensor(kind, code).unwrap();
                assert_eq!(activity.method, LockMethod::Rf);
                assert_eq!(activity.action.target_state(), Some(state));
            }
            assert_eq!(inferred_code(kind, LockState::Unknown), None);
        }
    }

    #[test]
    fn test_codes_unique_per_numbering() {
        for kind in [SensorKind::AlarmType, SensorKind::AccessControl] {
            let mut codes: Vec<u16> = ACTIVITIES.iter().filter_map(|a| a.code(kind)).collect();
            let total = codes.len();
            codes.sort_unstable();
            codes.dedup();
            assert_eq!(codes.len(), total);
        }
    }
}
