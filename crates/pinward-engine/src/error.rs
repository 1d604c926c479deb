use pinward_hardware::HardwareError;
use thiserror::Error;

/// Errors raised by coordinator operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] pinward_core::Error),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

impl EngineError {
    /// Whether the error means the lock could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, EngineError::Hardware(err) if err.is_connectivity())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_pass_through() {
        let err: EngineError = pinward_core::Error::LockNotFound("front".to_string()).into();
        assert_eq!(err.to_string(), "Lock not found: front");
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_hardware_connectivity() {
        let err: EngineError = HardwareError::disconnected("front").into();
        assert!(err.is_connectivity());
        let err: EngineError = HardwareError::verification_failed(2).into();
        assert!(!err.is_connectivity());
    }
}
