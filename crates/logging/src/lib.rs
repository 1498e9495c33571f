//! Structured logging for the model lifecycle manager
//!
//! Installs one global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use common::error::{Error, Result};
use lifecycle_config::{LogFormat, LoggingSettings};

/// File name prefix of rotated log files
pub const LOG_FILE_PREFIX: &str = "model-lifecycle.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive; drop it at shutdown to flush
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Builds the filter from `RUST_LOG`, falling back to `default_level`
pub fn build_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| Error::Config(format!("invalid log level {:?}: {}", default_level, e))),
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    }
}

/// Initializes the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<LogGuard> {
    let filter = build_filter(&settings.level)?;

    let mut layers: Vec<BoxedLayer> = vec![format_layer(settings.format, std::io::stderr, true)];

    let file_guard = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(settings.format, writer, false));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Internal(format!("failed to install log subscriber: {}", e)))?;

    Ok(LogGuard { _file: file_guard })
}
