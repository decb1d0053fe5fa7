//! Logging and tracing initialization.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config::LoggingConfig;
use crate::error::{LivemixError, LivemixResult};

/// Initialize the tracing subscriber with the given configuration.
///
/// When `config.file` is set, output goes to that file (appended) through a
/// background writer thread instead of stderr. The returned guard flushes
/// that writer when dropped, so hold it for the life of the process.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file = config.file.as_deref().and_then(|path| match file_writer(path) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!("livemix: cannot log to {}: {e}", path.display());
            None
        }
    });

    match (config.json, file) {
        (true, Some((writer, guard))) => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .json()
                .with_writer(writer)
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok();
            Some(guard)
        }
        (true, None) => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok();
            None
        }
        (false, Some((writer, guard))) => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok();
            Some(guard)
        }
        (false, None) => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok();
            None
        }
    }
}

/// Non-blocking writer appending to `path`. Log calls only enqueue; the
/// write happens on the appender's worker thread.
pub fn file_writer(path: &Path) -> LivemixResult<(NonBlocking, WorkerGuard)> {
    let name = path.file_name().ok_or_else(|| {
        LivemixError::config(format!("log path {} has no file name", path.display()))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| LivemixError::config(format!("cannot open log file: {e}")))?;
    Ok(tracing_appender::non_blocking(appender))
}
