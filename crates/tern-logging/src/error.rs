//! Logging setup errors

use thiserror::Error;

/// Failure while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rolling appender error: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("global subscriber already set: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

pub type LoggingResult<T> = Result<T, LoggingError>;
