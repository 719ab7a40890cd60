//! Error types for the virtual time engine

use std::io;

use tern_core::{AlarmError, ConfigError, DriverError, WaitError};
use thiserror::Error;

/// Virtual time errors
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Event payload too large: {size} bytes exceeds {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(u8),

    #[error("Truncated event: {len} bytes, need {need}")]
    Truncated { len: usize, need: usize },

    #[error("Sync channel error: {0}")]
    Io(#[from] io::Error),

    #[error("Virtual time engine not initialized")]
    NotInitialized,

    #[error("Clock error: {0}")]
    Clock(#[from] AlarmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SimError {
    /// Whether the coordinator sent something this node cannot accept
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SimError::PayloadTooLarge { .. }
                | SimError::UnknownEventKind(_)
                | SimError::Truncated { .. }
        )
    }
}

impl From<SimError> for WaitError {
    fn from(e: SimError) -> Self {
        WaitError::fatal("virtual-time", e)
    }
}

impl From<SimError> for DriverError {
    fn from(e: SimError) -> Self {
        match e {
            SimError::PayloadTooLarge { size, limit } => DriverError::FrameTooLarge { size, limit },
            SimError::Io(e) => DriverError::Io(e),
            SimError::NotInitialized => DriverError::NotInitialized,
            other => DriverError::Link(other.to_string()),
        }
    }
}

/// Result type alias for virtual time operations
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violations() {
        assert!(SimError::UnknownEventKind(9).is_protocol_violation());
        assert!(SimError::Truncated { len: 3, need: 11 }.is_protocol_violation());
        assert!(!SimError::NotInitialized.is_protocol_violation());
    }

    #[test]
    fn test_into_wait_error_is_fatal() {
        let err: WaitError = SimError::PayloadTooLarge {
            size: 2000,
            limit: 1024,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("virtual-time"));
        assert!(msg.contains("2000"));
        assert!(matches!(err, WaitError::Fatal { .. }));
    }

    #[test]
    fn test_into_driver_error() {
        let err: DriverError = SimError::PayloadTooLarge {
            size: 1500,
            limit: 1024,
        }
        .into();
        assert!(matches!(err, DriverError::FrameTooLarge { size: 1500, .. }));

        let err: DriverError = SimError::UnknownEventKind(7).into();
        assert!(matches!(err, DriverError::Link(_)));
    }
}
