use crate::error::{Error, Result};
use crate::serializer::panic_message;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

// the worker guard flushes the non-blocking writer, it has to live as long as the process
static LOG_GUARD: OnceCell<(String, WorkerGuard)> = OnceCell::new();

/// Route `tracing` output into `log_file_path`. `log_level` is the default level
/// (`info` when absent or unparsable), `RUST_LOG` directives still apply on top.
///
/// Only the first call installs anything, later calls return the configured path.
pub fn init_tracing(log_file_path: &str, log_level: Option<&str>) -> Result<String> {
    let (path, _) = LOG_GUARD.get_or_try_init(|| -> Result<(String, WorkerGuard)> {
        let path = Path::new(log_file_path);
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(directory).map_err(Error::CreateDir)?;

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let level = log_level
            .and_then(|level| level.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::INFO);
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_names(true),
            )
            .try_init()
            .map_err(|e| Error::TracingInit(e.to_string()))?;

        install_panic_hook();
        tracing::info!(path = %path.display(), %level, "Tracing initialized");

        Ok((path.to_string_lossy().into_owned(), guard))
    })?;

    Ok(path.clone())
}

/// Log panics through `tracing` instead of writing them to stderr, which the editor owns
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let thread = std::thread::current();

            tracing::error!(
                thread = thread.name().unwrap_or("<unnamed>"),
                %location,
                message = %panic_message(info.payload()),
                "Panic"
            );
        }));
    });
}
