//! Error types for lock provider operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a lock.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Lock is not connected or has been disconnected.
    #[error("Lock disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Operation is not supported by this platform.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Lock communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// A written or cleared usercode did not read back as expected.
    #[error("Usercode verification failed for slot {slot}")]
    VerificationFailed { slot: u16 },

    /// No provider is registered for the platform.
    #[error("Unknown lock platform: {platform}")]
    UnknownPlatform { platform: String },
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn verification_failed(slot: u16) -> Self {
        Self::VerificationFailed { slot }
    }

    pub fn unknown_platform(platform: impl Into<String>) -> Self {
        Self::UnknownPlatform {
            platform: platform.into(),
        }
    }

    /// Whether the error means the lock could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("front_door");
        assert!(error.is_connectivity());
        assert_eq!(error.to_string(), "Lock disconnected: front_door");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(3000);
        assert!(error.is_connectivity());
        assert_eq!(error.to_string(), "Operation timeout after 3000ms");
    }

    #[test]
    fn test_verification_error() {
        let error = HardwareError::verification_failed(4);
        assert!(!error.is_connectivity());
        assert_eq!(error.to_string(), "Usercode verification failed for slot 4");
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            HardwareError::communication("bus busy"),
            HardwareError::unsupported("refresh_usercode"),
            HardwareError::unknown_platform("zigbee"),
        ];

        for error in errors {
            let _ = format!("{}", error);
            let _ = format!("{:?}", error);
        }
    }
}
