use crate::constants::{MASK_CHAR, MIN_PIN_LENGTH};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Stable identifier of a lock.
///
/// Ids are opaque strings. Configured locks may provide their own id; when
/// they don't, a random UUID is generated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

impl LockId {
    /// Create a lock id from an existing identifier.
    ///
    /// # Errors
    /// Returns `Error::InvalidLockId` if the id is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidLockId("lock id must not be empty".to_string()));
        }
        Ok(LockId(trimmed.to_string()))
    }

    /// Generate a fresh random lock id.
    pub fn generate() -> Self {
        LockId(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LockId::new(s)
    }
}

/// A validated access code (digits only, at least four of them).
///
/// # Security
/// Comparison is constant-time and the `Debug` output is redacted, so a
/// `Pin` can be compared and logged without leaking its value or its
/// length through timing.
#[derive(Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin(String);

impl Pin {
    /// Create a PIN with validation.
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidPin` if:
    /// - The PIN contains anything other than ASCII digits
    /// - The PIN is shorter than [`MIN_PIN_LENGTH`]
    /// - The PIN is all zeros, which locks report for an empty slot
    pub fn new(pin: &str) -> Result<Self> {
        let pin = pin.trim();

        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidPin("PIN must contain only digits".to_string()));
        }

        let len = pin.len();
        if len < MIN_PIN_LENGTH {
            return Err(Error::InvalidPin(format!(
                "PIN must be at least {MIN_PIN_LENGTH} digits, got {len}"
            )));
        }

        if is_cleared_code(pin) {
            return Err(Error::InvalidPin("PIN must not be all zeros".to_string()));
        }

        Ok(Pin(pin.to_string()))
    }

    /// Get the PIN digits. Only use this to hand the value to a lock.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Pin(<redacted>)")
    }
}

impl std::str::FromStr for Pin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pin::new(s)
    }
}

impl TryFrom<String> for Pin {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Pin::new(&value)
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.0
    }
}

/// Constant-time comparison implementation for Pin
impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

/// Returns true if a raw code read from a lock is a masked placeholder.
pub fn is_masked(raw: &str) -> bool {
    raw.contains(MASK_CHAR)
}

/// Returns true if a raw code read from a lock means "no code programmed".
///
/// Some firmware reports a cleared slot as a run of zeros instead of an
/// empty string.
pub fn is_cleared_code(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw.chars().all(|c| c == '0')
}

/// Interpretation of a usercode value reported by lock hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedPin {
    /// No code is programmed in the slot.
    Cleared,
    /// The lock holds a code but did not disclose it (masked or unreadable).
    Hidden,
    /// The lock reported a real code.
    Code(Pin),
}

impl ObservedPin {
    /// Classify a raw usercode string.
    pub fn parse(raw: &str) -> Self {
        if is_masked(raw) {
            return ObservedPin::Hidden;
        }
        if is_cleared_code(raw) {
            return ObservedPin::Cleared;
        }
        match Pin::new(raw) {
            Ok(pin) => ObservedPin::Code(pin),
            Err(_) => ObservedPin::Hidden,
        }
    }
}

/// Synchronization status of a code slot against its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    /// A PIN write is in flight.
    Adding,
    /// A PIN clear is in flight.
    Deleting,
    /// The lock is not reachable.
    #[default]
    Disconnected,
    /// Hardware disagrees with the desired state.
    #[serde(rename = "Out of Sync")]
    OutOfSync,
    /// Hardware matches the desired state.
    Synced,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SyncStatus::Adding => "Adding",
            SyncStatus::Deleting => "Deleting",
            SyncStatus::Disconnected => "Disconnected",
            SyncStatus::OutOfSync => "Out of Sync",
            SyncStatus::Synced => "Synced",
        };
        write!(f, "{}", s)
    }
}

/// Logical bolt state of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unknown,
    Locked,
    Unlocked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            LockState::Unknown => "unknown",
            LockState::Locked => "locked",
            LockState::Unlocked => "unlocked",
        };
        write!(f, "{}", s)
    }
}

/// Door sensor state of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DoorState::Unknown => "unknown",
            DoorState::Open => "open",
            DoorState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234", "1234")]
    #[case(" 5678 ", "5678")]
    #[case("0000123456", "0000123456")]
    fn test_pin_valid(#[case] input: &str, #[case] expected: &str) {
        let pin = Pin::new(input).unwrap();
        assert_eq!(pin.as_str(), expected);
    }

    #[rstest]
    #[case("123")] // too short
    #[case("")] // empty
    #[case("12a4")] // non-numeric
    #[case("****")] // masked
    #[case("12 34")] // inner whitespace
    #[case("0000")] // reads back as a cleared slot
    #[case(" 000000 ")]
    fn test_pin_invalid(#[case] input: &str) {
        assert!(matches!(Pin::new(input), Err(Error::InvalidPin(_))));
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::new("9876").unwrap();
        let debug = format!("{:?}", pin);
        assert!(!debug.contains("9876"));
    }

    #[test]
    fn test_pin_equality() {
        assert_eq!(Pin::new("1234").unwrap(), Pin::new("1234").unwrap());
        assert_ne!(Pin::new("1234").unwrap(), Pin::new("12345").unwrap());
    }

    #[test]
    fn test_pin_serde_validates() {
        let pin: Pin = serde_json::from_str("\"4321\"").unwrap();
        assert_eq!(pin.as_str(), "4321");
        assert!(serde_json::from_str::<Pin>("\"**********\"").is_err());
        assert_eq!(serde_json::to_string(&pin).unwrap(), "\"4321\"");
    }

    #[rstest]
    #[case("", ObservedPin::Cleared)]
    #[case("0000", ObservedPin::Cleared)]
    #[case("**********", ObservedPin::Hidden)]
    #[case("12*4", ObservedPin::Hidden)]
    #[case("12", ObservedPin::Hidden)]
    fn test_observed_pin_without_code(#[case] raw: &str, #[case] expected: ObservedPin) {
        assert_eq!(ObservedPin::parse(raw), expected);
    }

    #[test]
    fn test_observed_pin_code() {
        assert_eq!(
            ObservedPin::parse("2468"),
            ObservedPin::Code(Pin::new("2468").unwrap())
        );
    }

    #[test]
    fn test_lock_id() {
        let id: LockId = " front ".parse().unwrap();
        assert_eq!(id.as_str(), "front");
        assert!(LockId::new("  ").is_err());
        assert_ne!(LockId::generate(), LockId::generate());
    }

    #[test]
    fn test_sync_status_display() {
        assert_eq!(SyncStatus::OutOfSync.to_string(), "Out of Sync");
        assert_eq!(SyncStatus::default(), SyncStatus::Disconnected);
    }
}
