//! Locations of the `.edgesense` application folder and the files inside it.
//!
//! The root lives under the OS config directory unless `EDGESENSE_CONFIG_HOME`
//! names another base, which tests and portable installs use.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use directories::BaseDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".edgesense";
/// Environment variable replacing the OS config directory as the base.
pub const CONFIG_HOME_ENV: &str = "EDGESENSE_CONFIG_HOME";
pub const CONFIG_FILE_NAME: &str = "edgesense.toml";

static BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No config directory available; set {CONFIG_HOME_ENV}")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `<base>/.edgesense`, created on demand.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// `<app root>/logs`, created on demand.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

/// `<app root>/models`, created on demand.
pub fn models_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("models"))
}

/// Default configuration file path; the file itself may not exist.
pub fn config_file_path() -> Result<PathBuf, AppDirError> {
    Ok(app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve `path` against the app root unless it is already absolute.
pub fn resolve_in_root(path: &Path) -> Result<PathBuf, AppDirError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(app_root_dir()?.join(path))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn base_dir() -> Option<PathBuf> {
    let forced = BASE_OVERRIDE.lock().ok().and_then(|guard| guard.clone());
    if forced.is_some() {
        return forced;
    }
    match std::env::var_os(CONFIG_HOME_ENV) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()),
    }
}

#[cfg(test)]
pub(crate) struct BaseOverrideGuard;

#[cfg(test)]
impl BaseOverrideGuard {
    pub(crate) fn set(path: &Path) -> Self {
        if let Ok(mut guard) = BASE_OVERRIDE.lock() {
            *guard = Some(path.to_path_buf());
        }
        Self
    }
}

#[cfg(test)]
impl Drop for BaseOverrideGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = BASE_OVERRIDE.lock() {
            *guard = None;
        }
    }
}
