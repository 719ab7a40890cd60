//! Error types for the platform

use tern_core::{ConfigError, DriverError, MainloopError};
use tern_sim::SimError;
use thiserror::Error;

/// Errors raised while assembling or running a platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A driver could not be built
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Virtual time engine failure
    #[error("Virtual time error: {0}")]
    Sim(#[from] SimError),

    /// Mainloop failure
    #[error("Mainloop error: {0}")]
    Mainloop(#[from] MainloopError),

    /// Platform not initialized
    #[error("Platform not initialized")]
    NotStarted,
}

impl PlatformError {
    /// Whether the error ended the run rather than a single operation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PlatformError::NotStarted)
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
