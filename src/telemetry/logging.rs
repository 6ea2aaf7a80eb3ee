//! Subscriber setup for the engine host.
//!
//! Logs never go to stdout, which carries `ipi-core-cli` command output.
//! They are written to stderr, or to `IPI_LOG_FILE` when set, in either format.

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// `pretty` selects [`LogFormat::Pretty`]; anything else is JSON.
    pub fn parse_lossy(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info` or `ipi_core::reload=debug`.
    pub filter: String,
    /// Log file, truncated at startup. Stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Json, filter: "info".to_string(), file: None }
    }
}

impl LogConfig {
    /// Read `IPI_LOG_FORMAT`, `IPI_LOG_LEVEL` and `IPI_LOG_FILE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            format: std::env::var("IPI_LOG_FORMAT")
                .map(|v| LogFormat::parse_lossy(&v))
                .unwrap_or(defaults.format),
            filter: std::env::var("IPI_LOG_LEVEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.filter),
            file: std::env::var_os("IPI_LOG_FILE").map(PathBuf::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once, before the engine starts.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = make_writer(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_writer(writer)).try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn make_writer(config: &LogConfig) -> Result<BoxMakeWriter, LogError> {
    match &config.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|source| LogError::FileOpen { path: path.clone(), source })?;
            Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}
