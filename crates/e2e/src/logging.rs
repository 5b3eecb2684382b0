//! Process-wide logging: console plus a log file
//!
//! Call [`init`] once before the first scenario and keep the returned
//! [`LoggingGuard`] alive until the process exits; dropping it flushes the
//! file writer. The harness itself only emits `tracing` events, so tests can
//! swap in their own subscriber with `tracing::subscriber::with_default`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_DIRECTIVES: &str = "info,bmc_e2e=debug,e2e=debug";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log file, appended to; `None` logs to the console only
    pub file: Option<PathBuf>,
    pub console_level: LevelFilter,
    pub file_level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("redfish_tests.log")),
            console_level: LevelFilter::INFO,
            file_level: LevelFilter::DEBUG,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

/// Keeps the file writer alive; drop it at shutdown to flush
#[must_use = "dropping the guard stops the log file writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. A second call fails with `AlreadyInitialized`.
pub fn init(config: &LogConfig) -> Result<LoggingGuard, InitError> {
    if INIT.get().is_some() {
        return Err(InitError::AlreadyInitialized);
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(config.console_level);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(config.file_level);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|err| InitError::Configure(err.to_string()))?;

    INIT.set(()).ok();
    Ok(LoggingGuard { _file: guard })
}
