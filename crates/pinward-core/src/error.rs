use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Input validation
    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Invalid lock id: {0}")]
    InvalidLockId(String),

    #[error("Invalid property path '{path}': {reason}")]
    InvalidPropertyPath { path: String, reason: String },

    #[error("Property type mismatch for {field}: expected {expected}")]
    PropertyTypeMismatch { field: String, expected: String },

    // Registry lookups
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Code slot {slot} not found on lock {lock}")]
    SlotNotFound { lock: String, slot: u16 },

    #[error("Duplicate lock name: {0}")]
    DuplicateLockName(String),

    // Slot state
    #[error("Code slot {slot} on {lock} mirrors its parent and cannot be edited")]
    SlotMirrorsParent { lock: String, slot: u16 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_errors_name_the_lock() {
        let err = Error::SlotNotFound {
            lock: "front_door".to_string(),
            slot: 3,
        };
        assert_eq!(err.to_string(), "Code slot 3 not found on lock front_door");

        let err = Error::SlotMirrorsParent {
            lock: "side_door".to_string(),
            slot: 1,
        };
        assert!(err.to_string().contains("mirrors its parent"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
