//! Structured JSONL logging with request correlation for Tessera KMS
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Request Context Injection**: Attach the active request to every span
//! - **Batch Correlation**: Link each batch item to its batch through correlation IDs
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera_logging::{TesseraSubscriberBuilder, LogConfig};
//!
//! // JSONL on stderr at info
//! let _guard = TesseraSubscriberBuilder::new().try_init()?;
//!
//! // Pretty debug output while working on the server
//! let _guard = TesseraSubscriberBuilder::new()
//!     .with_config(LogConfig::verbose())
//!     .try_init()?;
//! ```
//!
//! # Correlation IDs
//!
//! ```ignore
//! use tessera_logging::{CorrelationContext, CorrelationExt};
//!
//! let batch = CorrelationContext::new_root();
//! let item = batch.child(0).with_operation("Activate");
//! let span = tracing::info_span!(
//!     "batch_item",
//!     trace_id = tracing::field::Empty,
//!     span_id = tracing::field::Empty,
//! );
//! span.record_correlation(&item);
//! ```

pub mod config;
pub mod context;
pub mod correlation;
pub mod layers;

pub use config::{ConsoleFormat, FileConfig, JsonlConfig, LOG_FILE_PREFIX, LogConfig, RotationStrategy};
pub use context::{RequestContextData, RequestContextGuard};
pub use correlation::{CorrelationContext, CorrelationExt, fields, spans};
pub use layers::{RequestContextExtension, RequestContextLayer};

use std::fs::{self, File};
use std::io::IsTerminal;

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Log file or directory could not be created
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling appender could not be configured
    #[error("Log appender error: {0}")]
    Appender(String),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

pub type LoggingResult<T> = Result<T, LoggingError>;

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Builder for configuring and initializing the Tessera logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::verbose()`
/// for human-readable output.
pub struct TesseraSubscriberBuilder {
    config: LogConfig,
}

impl TesseraSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Choose the stderr format
    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes the file writer when dropped and must be
    /// kept alive for as long as file output is wanted.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.level));

        let mut layers: Vec<BoxedLayer<Registry>> = Vec::new();
        let mut guard = None;

        // Console output goes to stderr; stdout belongs to the caller.
        match self.config.console {
            ConsoleFormat::Off => {}
            ConsoleFormat::Json => layers.push(jsonl_layer(&self.config.jsonl, std::io::stderr)),
            ConsoleFormat::Pretty => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .boxed(),
            ),
        }

        if let Some(file_config) = &self.config.file {
            let (writer, worker) = file_writer(file_config)?;
            guard = Some(worker);
            layers.push(jsonl_layer(&self.config.jsonl, writer));
        }

        Registry::default()
            .with(layers)
            .with(env_filter)
            .with(RequestContextLayer::new())
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }
}

impl Default for TesseraSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a JSONL formatting layer
pub fn jsonl_layer<S, W>(config: &JsonlConfig, writer: W) -> BoxedLayer<S>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.span_list)
        .flatten_event(true)
        .with_file(config.location)
        .with_line_number(config.location)
        .with_thread_ids(true)
        .with_writer(writer)
        .boxed()
}

/// Open the configured log file; `Never` truncates a single file
fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory)?;
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let file = File::create(config.directory.join(format!("{LOG_FILE_PREFIX}.log")))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}
