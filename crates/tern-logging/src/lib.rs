//! Structured logging for the Tern host runtime
//!
//! - **JSONL output** to the console or to files (default)
//! - **Pretty output** for development
//! - **Node context**: spans carry the simulated node they belong to
//! - **File rotation** via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use tern_logging::{LogConfig, TernSubscriberBuilder};
//!
//! let _guard = TernSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! # Node Context
//!
//! ```ignore
//! use tern_logging::NodeContextGuard;
//!
//! let _ctx = NodeContextGuard::for_config(&config);
//! let _span = NodeContextGuard::span().entered();
//! tracing::info!("radio up");
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard, TimeKind};
pub use error::{LoggingError, LoggingResult};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// The fully assembled subscriber
pub type TernSubscriber =
    Layered<EnvFilter, Layered<NodeContextLayer, Layered<Vec<BoxedLayer>, Registry>>>;

/// Keeps background log writers alive. Dropping it flushes pending lines.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops background log writers"]
pub struct LogGuard {
    _workers: Vec<WorkerGuard>,
}

/// Builder for the logging subscriber
#[derive(Debug, Clone, Default)]
pub struct TernSubscriberBuilder {
    config: LogConfig,
}

impl TernSubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default level (RUST_LOG still wins)
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Assemble the subscriber without installing it
    pub fn build(self) -> LoggingResult<(TernSubscriber, LogGuard)> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut workers = Vec::new();

        let console = &self.config.console;
        if console.enabled {
            if console.pretty {
                layers.push(fmt::layer().pretty().with_ansi(console.ansi).boxed());
            } else {
                layers.push(json_layer(&self.config.jsonl, std::io::stdout));
            }
        }

        if let Some(file) = &self.config.file {
            let (writer, worker) = file_writer(file)?;
            layers.push(json_layer(&self.config.jsonl, writer));
            workers.push(worker);
        }

        let subscriber = Registry::default()
            .with(layers)
            .with(NodeContextLayer::new())
            .with(env_filter);
        Ok((subscriber, LogGuard { _workers: workers }))
    }

    /// Install the subscriber globally
    pub fn init(self) -> LoggingResult<LogGuard> {
        let (subscriber, guard) = self.build()?;
        subscriber.try_init()?;
        Ok(guard)
    }
}

fn json_layer<W>(jsonl: &JsonlConfig, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(jsonl.flatten_events)
        .with_current_span(jsonl.include_spans)
        .with_span_list(jsonl.include_spans)
        .with_file(jsonl.include_location)
        .with_line_number(jsonl.include_location)
        .with_thread_ids(jsonl.include_thread_info)
        .with_thread_names(jsonl.include_thread_info)
        .with_writer(writer)
        .boxed()
}

fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to the console at the default level
pub fn init_default() -> LoggingResult<LogGuard> {
    TernSubscriberBuilder::new().init()
}

/// Pretty console output at debug level
pub fn init_development() -> LoggingResult<LogGuard> {
    TernSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Quiet logging for tests. Safe to call more than once.
pub fn init_testing() {
    if let Ok(guard) = TernSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init()
    {
        std::mem::forget(guard);
    }
}
