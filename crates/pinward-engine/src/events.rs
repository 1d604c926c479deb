//! Event types flowing into and out of the coordinator.
//!
//! Providers push raw [`LockEvent`]s. [`interpret`] turns them into a bolt
//! or door transition using the activity table, and the coordinator
//! publishes the outcome as a [`LockNotification`].
//!
//! ```text
//! provider callback ──► CoordinatorEvent (mpsc) ──► Coordinator
//!                                                       │
//!                                                       ▼
//!                                LockNotification (broadcast) ──► subscribers
//! ```

use chrono::{DateTime, Utc};
use pinward_core::constants::STALE_SENSOR_SECONDS;
use pinward_core::{DoorState, LockId, LockState};
use pinward_hardware::LockEvent;
use pinward_hardware::activity::{UNKNOWN_ACTIVITY, by_notification, by_sensor, inferred_code};
use serde::{Deserialize, Serialize};

/// Where a lock transition was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// An access-control notification event.
    Notification,
    /// A bolt state change with alarm sensor readings.
    StateChange,
}

/// A lock or unlock with what caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTransition {
    pub target: LockState,
    pub event_label: String,
    /// Keypad slot used, or 0 when the activity was not a keypad entry.
    pub code_slot_num: u16,
    /// Raw activity code as reported (or inferred).
    pub action_code: Option<u16>,
    pub source: EventSource,
}

/// Meaning of a raw lock event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpreted {
    Lock(LockTransition),
    Door(DoorState),
}

/// Interpret a raw provider event.
///
/// Returns `None` for events that carry no lock or door transition: unknown
/// notification codes, informational reports, transitions out of an unknown
/// state, or state changes reported without sensor readings.
pub fn interpret(event: &LockEvent, now: DateTime<Utc>) -> Option<Interpreted> {
    match event {
        LockEvent::Notification {
            event_code,
            user_id,
            event_label,
        } => {
            let Some(activity) = by_notification(*event_code) else {
                tracing::debug!(
                    "Ignoring notification {} ({})",
                    event_code,
                    event_label.as_deref().unwrap_or(UNKNOWN_ACTIVITY)
                );
                return None;
            };
            let target = activity.action.target_state()?;
            let code_slot_num = if activity.is_keypad() {
                user_id.unwrap_or(0)
            } else {
                0
            };
            Some(Interpreted::Lock(LockTransition {
                target,
                event_label: activity.name.to_string(),
                code_slot_num,
                action_code: Some(*event_code),
                source: EventSource::Notification,
            }))
        }

        LockEvent::StateChanged {
            old,
            new,
            sensor,
            alarm_level,
            alarm_type,
            alarm_type_changed_at,
        } => {
            if !matches!(old, LockState::Locked | LockState::Unlocked)
                || !matches!(new, LockState::Locked | LockState::Unlocked)
                || old == new
            {
                return None;
            }
            let (Some(alarm_level), Some(mut alarm_type)) = (*alarm_level, *alarm_type) else {
                return None;
            };

            let stale = alarm_type_changed_at
                .is_none_or(|at| (now - at).num_seconds() > STALE_SENSOR_SECONDS);
            if alarm_level == 0
                && stale
                && let Some(code) = inferred_code(*sensor, *new)
            {
                alarm_type = code;
            }

            let activity = by_sensor(*sensor, alarm_type);
            let event_label = activity.map_or(UNKNOWN_ACTIVITY, |a| a.name).to_string();
            let code_slot_num = match activity {
                Some(a) if a.is_keypad() => alarm_level,
                _ => 0,
            };
            Some(Interpreted::Lock(LockTransition {
                target: *new,
                event_label,
                code_slot_num,
                action_code: Some(alarm_type),
                source: EventSource::StateChange,
            }))
        }

        LockEvent::DoorChanged { old, new } => match new {
            DoorState::Open | DoorState::Closed if new != old => Some(Interpreted::Door(*new)),
            _ => None,
        },
    }
}

/// Work item for the coordinator's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Lock { lock_id: LockId, event: LockEvent },
    Connection { lock_id: LockId, connected: bool },
    AutolockFired { lock_id: LockId },
    Refresh,
}

/// Outbound notification published by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LockNotification {
    StateChanged {
        lock_id: LockId,
        lock_name: String,
        state: LockState,
        event_label: String,
        action_code: Option<u16>,
        code_slot_num: u16,
        code_slot_name: Option<String>,
        source: EventSource,
    },
    DoorChanged {
        lock_id: LockId,
        lock_name: String,
        state: DoorState,
    },
    Connection {
        lock_id: LockId,
        lock_name: String,
        connected: bool,
    },
}

impl LockNotification {
    pub fn lock_id(&self) -> &LockId {
        match self {
            LockNotification::StateChanged { lock_id, .. }
            | LockNotification::DoorChanged { lock_id, .. }
            | LockNotification::Connection { lock_id, .. } => lock_id,
        }
    }
}
