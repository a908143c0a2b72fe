//! Tracing setup for the command-line tools.
//!
//! Events go to stdout and to a per-launch file `edgesense_<timestamp>.log`
//! under the app's `logs` directory. Only the newest [`MAX_LOG_FILES`] files
//! are kept.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "edgesense_";
const DEFAULT_FILTER: &str = "info";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Failed to access log path {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log file timestamp: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Failed to install tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the stdout + file subscriber in the app's log directory.
///
/// Repeated calls return `Ok` without touching the installed subscriber.
pub fn init() -> Result<PathBuf, LoggingError> {
    init_in(&app_dirs::logs_dir()?)
}

/// Like [`init`], writing the log file into `dir`.
pub fn init_in(dir: &Path) -> Result<PathBuf, LoggingError> {
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    let name = log_file_name(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()))?;
    let path = dir.join(&name);
    if FILE_GUARD.get().is_some() {
        return Ok(path);
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| io_error(&path, source))?;
    prune_logs(dir, MAX_LOG_FILES)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(dir, &name));
    let timer = local_timer();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_timer(timer.clone()).with_writer(std::io::stdout))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = FILE_GUARD.set(guard);
    tracing::info!(path = %path.display(), "logging initialized");
    Ok(path)
}

fn log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const STAMP: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!("{LOG_FILE_PREFIX}{}.log", now.format(STAMP)?))
}

/// Delete the oldest of our log files beyond `keep`.
///
/// Names embed a sortable timestamp, so name order is age order. Files
/// without the prefix are left alone.
fn prune_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let mut ours: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| io_error(dir, source))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .collect();
    if ours.len() <= keep {
        return Ok(());
    }
    ours.sort();
    let excess = ours.len() - keep;
    for path in &ours[..excess] {
        fs::remove_file(path).map_err(|source| io_error(path, source))?;
    }
    Ok(())
}

fn local_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY.into())
}

fn io_error(path: &Path, source: std::io::Error) -> LoggingError {
    LoggingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_name_embeds_timestamp() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            log_file_name(fixed).unwrap(),
            "edgesense_2023-11-14_22-13-20.log"
        );
    }

    #[test]
    fn prune_keeps_newest_and_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        for day in 10..22 {
            fs::write(dir.path().join(format!("edgesense_2024-01-{day}_00-00-00.log")), "").unwrap();
        }
        fs::write(dir.path().join("other.log"), "").unwrap();
        prune_logs(dir.path(), 10).unwrap();
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 11);
        assert_eq!(names[0], "edgesense_2024-01-12_00-00-00.log");
        assert!(names.contains(&"other.log".to_string()));
    }
}
