//! Tracing subscriber setup.
//!
//! Logs go to `<log_dir>/versed.log` (append, no ANSI). When the file cannot
//! be opened we fall back to stderr so an operation is never blocked by
//! logging. Filter comes from `VERSED_LOG`, default `info`.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

/// Env var read for the filter directive
pub const LOG_ENV: &str = "VERSED_LOG";

/// Log file name inside the log directory
pub const LOG_FILE: &str = "versed.log";

/// Where logs ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink
{
    File(PathBuf),
    Stderr,
}

fn filter() -> EnvFilter
{
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Safe to call twice; the second call is a no-op.
pub fn init(log_dir: &Path) -> LogSink
{
    let opened = fs::create_dir_all(log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(LOG_FILE))
    });

    match opened
    {
        Ok(file) =>
        {
            let _ = fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            let path = log_dir.join(LOG_FILE);
            debug!(log = %path.display(), "logging initialized");
            LogSink::File(path)
        }
        Err(_) =>
        {
            let _ = fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .try_init();
            LogSink::Stderr
        }
    }
}
