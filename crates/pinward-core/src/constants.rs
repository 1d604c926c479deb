//! Timing and validation constants for the coordinator.
//!
//! These values mirror the behavior lock owners are used to: a 5 second
//! debounce on hardware bursts, two hour daytime autolock and a five minute
//! night autolock.

use std::time::Duration;

// ============================================================================
// Event handling
// ============================================================================

/// Cooldown applied to duplicate lock, unlock and door events.
pub const THROTTLE_SECONDS: u64 = 5;

/// Throttle cooldown as a [`Duration`].
pub const THROTTLE_COOLDOWN: Duration = Duration::from_secs(THROTTLE_SECONDS);

/// An alarm type sensor that has not changed for this long is considered
/// stale and is replaced by the value implied by the new lock state.
pub const STALE_SENSOR_SECONDS: i64 = 5;

/// Capacity of the coordinator's inbound event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the outbound notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

// ============================================================================
// Autolock
// ============================================================================

/// Autolock delay in minutes while the sun is up.
pub const DEFAULT_AUTOLOCK_MIN_DAY: u32 = 120;

/// Autolock delay in minutes while the sun is down.
pub const DEFAULT_AUTOLOCK_MIN_NIGHT: u32 = 5;

/// Default local hour at which the day period starts.
pub const DEFAULT_SUNRISE_HOUR: u32 = 7;

/// Default local hour at which the night period starts.
pub const DEFAULT_SUNSET_HOUR: u32 = 19;

// ============================================================================
// Refresh cycle
// ============================================================================

/// Interval between full refresh cycles.
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 60;

/// Delay before a follow-up refresh after a PIN change.
pub const QUICK_REFRESH_SECONDS: u64 = 15;

/// Every this many refresh cycles, slots are read directly from the lock
/// instead of from the provider's cache.
pub const SYNC_STATUS_THRESHOLD: u32 = 15;

// ============================================================================
// Code slots
// ============================================================================

/// Minimum number of digits in a PIN.
pub const MIN_PIN_LENGTH: usize = 4;

/// Character used by lock firmware to hide a stored PIN.
pub const MASK_CHAR: char = '*';

/// Default number of code slots managed per lock.
pub const DEFAULT_SLOT_COUNT: u16 = 5;

/// Default first managed slot number.
pub const DEFAULT_START_SLOT: u16 = 1;

/// Number of day-of-week rules per slot, Monday = 0.
pub const DAYS_PER_WEEK: u8 = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_duration_matches_seconds() {
        assert_eq!(THROTTLE_COOLDOWN.as_secs(), THROTTLE_SECONDS);
    }

    #[test]
    fn test_night_autolock_shorter_than_day() {
        assert!(DEFAULT_AUTOLOCK_MIN_NIGHT < DEFAULT_AUTOLOCK_MIN_DAY);
        assert!(DEFAULT_SUNRISE_HOUR < DEFAULT_SUNSET_HOUR);
    }
}
