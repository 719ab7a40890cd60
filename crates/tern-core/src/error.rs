//! Error types for the Tern host runtime

use std::io;

use thiserror::Error;

/// Top-level error type for the Tern runtime
#[derive(Debug, Error)]
pub enum TernError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Alarm error: {0}")]
    Alarm(#[from] AlarmError),

    #[error("Mainloop error: {0}")]
    Mainloop(#[from] MainloopError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Text error: {0}")]
    Text(#[from] TextError),
}

/// Errors raised by a driver's init or process step
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Driver not initialized")]
    NotInitialized,

    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame too large: {size} bytes exceeds {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Link closed")]
    LinkClosed,

    #[error("Link error: {0}")]
    Link(String),
}

/// Caller-input errors from the alarm service and clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlarmError {
    #[error("Real-time clock cannot be advanced manually")]
    NotAdvanceable,

    #[error("Clock overflow advancing {now} by {delta}")]
    Overflow { now: u64, delta: u64 },
}

/// Errors returned by a [`Waiter`](crate::mainloop::Waiter)
#[derive(Debug, Error)]
pub enum WaitError {
    /// A signal interrupted the wait. The mainloop treats this as "nothing ready".
    #[error("Wait interrupted")]
    Interrupted,

    #[error("Wait failed: {0}")]
    Io(#[from] io::Error),

    #[error("{subsystem} failed: {source}")]
    Fatal {
        subsystem: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl WaitError {
    /// Wrap an arbitrary error as fatal for the named subsystem
    pub fn fatal<E>(subsystem: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WaitError::Fatal {
            subsystem,
            source: Box::new(source),
        }
    }
}

/// Errors that terminate the run (or refuse to start it)
#[derive(Debug, Error)]
pub enum MainloopError {
    #[error("Driver '{driver}' failed to initialize: {source}")]
    DriverInit {
        driver: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("Wait failed in {subsystem}: {source}")]
    Wait {
        subsystem: &'static str,
        #[source]
        source: WaitError,
    },

    #[error("Driver '{0}' is already registered")]
    DuplicateDriver(&'static str),

    #[error("Alarm error: {0}")]
    Alarm(#[from] AlarmError),
}

/// Errors in platform configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid interface name: {0}")]
    InterfaceName(#[from] TextError),

    #[error("Invalid radio URL '{url}': {reason}")]
    RadioUrl { url: String, reason: String },

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Speed-up factor must be at least 1")]
    InvalidSpeedUpFactor,

    #[error("Port out of range for node {node_id}")]
    PortOutOfRange { node_id: u16 },
}

/// Outcomes of the bounded text helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("Output truncated")]
    Truncated,

    #[error("Invalid arguments")]
    InvalidArgs,

    #[error("Too long: {len} bytes exceeds {max}")]
    TooLong { len: usize, max: usize },

    #[error("Empty string")]
    Empty,

    #[error("Invalid UTF-8")]
    InvalidUtf8,
}

/// Result type alias for Tern operations
pub type TernResult<T> = Result<T, TernError>;
