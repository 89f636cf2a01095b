//! File and terminal logging setup.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global root logger.
static LOGGING_GUARDS: OnceLock<LoggingGuards> = OnceLock::new();

/// Logger thread handles, which must be kept alive for as long as the
/// logging targets will be used. Flushed automatically when dropped.
pub struct LoggingGuards {
    _stdout: Mutex<WorkerGuard>,
    _file: Mutex<WorkerGuard>,
}

/// Set up file and terminal logging. The file logger appends to
/// `labport.log` under `log_dir`; the level comes from `RUST_LOG` and
/// defaults to `info`.
///
/// Safe to call more than once; later calls return the existing guards.
pub fn init_logging(log_dir: &Path) -> Result<(PathBuf, &'static LoggingGuards), String> {
    fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log directory: {e}"))?;
    let log_path = log_dir.join("labport.log");

    if let Some(guards) = LOGGING_GUARDS.get() {
        return Ok((log_path, guards));
    }

    let logfile = OpenOptions::new()
        .create(true)
        .truncate(false)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {e}"))?;

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| format!("Failed to set up logging env filter: {e}"))?;

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))?;

    let guards = LOGGING_GUARDS.get_or_init(|| LoggingGuards {
        _stdout: Mutex::new(stdout_guard),
        _file: Mutex::new(file_guard),
    });

    Ok((log_path, guards))
}
