//! Types exchanged between lock providers and the coordinator.

use crate::activity::SensorKind;
use chrono::{DateTime, Utc};
use pinward_core::{DoorState, LockState, ObservedPin};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One usercode slot as reported by a lock.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usercode {
    pub slot_num: u16,
    /// Raw code string; may be empty, masked or a zero sentinel.
    pub code: String,
    pub in_use: bool,
}

impl Usercode {
    pub fn new(slot_num: u16, code: impl Into<String>, in_use: bool) -> Self {
        Self {
            slot_num,
            code: code.into(),
            in_use,
        }
    }

    /// Interpret the raw code.
    pub fn observed(&self) -> ObservedPin {
        if !self.in_use {
            return ObservedPin::Cleared;
        }
        ObservedPin::parse(&self.code)
    }
}

impl fmt::Debug for Usercode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Usercode")
            .field("slot_num", &self.slot_num)
            .field("code", &"<redacted>")
            .field("in_use", &self.in_use)
            .finish()
    }
}

/// Raw lock activity pushed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockEvent {
    /// Access-control notification from the lock.
    Notification {
        /// Platform event code, looked up in the activity table.
        event_code: u16,
        /// Slot the code was entered on, when the lock reports one.
        user_id: Option<u16>,
        /// Label supplied by the platform for unknown codes.
        event_label: Option<String>,
    },

    /// The bolt state changed, with the alarm sensor readings at that moment.
    StateChanged {
        old: LockState,
        new: LockState,
        sensor: SensorKind,
        alarm_level: Option<u16>,
        alarm_type: Option<u16>,
        /// When the alarm type sensor last changed value.
        alarm_type_changed_at: Option<DateTime<Utc>>,
    },

    /// The door sensor changed.
    DoorChanged { old: DoorState, new: DoorState },
}

/// Callback receiving lock activity.
pub type LockEventCallback = Arc<dyn Fn(LockEvent) + Send + Sync>;

/// Callback receiving connectivity changes.
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by a subscription; dropping it unsubscribes.
///
/// # Examples
///
/// ```
/// use pinward_hardware::Subscription;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let removed = Arc::new(AtomicBool::new(false));
/// let flag = removed.clone();
/// let sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
///
/// sub.unsubscribe();
/// assert!(removed.load(Ordering::SeqCst));
/// ```
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription for providers without push support.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn is_noop(&self) -> bool {
        self.cancel.is_none()
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
