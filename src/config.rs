//! `edgesense.toml` settings.
//!
//! Every section is optional and falls back to defaults. The feature recipe
//! is not configurable; it is part of the model input contract.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::anomaly::AnomalyOptions;
use crate::app_dirs::{self, AppDirError};
use crate::dataset::SplitOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub anomaly: Option<PathBuf>,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            classifier: PathBuf::from("models/classifier.json"),
            anomaly: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Guard the classifier with a single lock for runtimes that cannot run concurrently.
    pub serialize_classifier: bool,
    pub parallel_batches: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            serialize_classifier: false,
            parallel_batches: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub test_fraction: f64,
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            test_fraction: 0.15,
            val_fraction: 0.15,
            seed: 42,
        }
    }
}

impl DatasetSettings {
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            test_fraction: self.test_fraction,
            val_fraction: self.val_fraction,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelPaths,
    pub inference: InferenceSettings,
    pub anomaly: AnomalyOptions,
    pub dataset: DatasetSettings,
    /// Directory relative model paths resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Config {
    /// Load `explicit` if given, else `<app root>/edgesense.toml`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&app_dirs::config_file_path()?),
        }
    }

    /// Parse `path`; a missing file yields defaults anchored at its directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path.parent().map(Path::to_path_buf);
        if !path.exists() {
            debug!(path = %path.display(), "config file missing, using defaults");
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = base_dir;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write TOML through a sibling temp file and rename it into place.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let text = toml::to_string_pretty(self).map_err(|source| ConfigError::SerializeToml {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        Ok(())
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.resolve(&self.models.classifier)
    }

    pub fn anomaly_path(&self) -> Option<PathBuf> {
        self.models.anomaly.as_deref().map(|path| self.resolve(path))
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.resolve(&self.dataset.raw_dir)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.resolve(&self.dataset.processed_dir)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("edgesense.toml")).unwrap();
        assert_eq!(config.anomaly, AnomalyOptions::default());
        assert!(config.inference.parallel_batches);
        assert_eq!(
            config.classifier_path(),
            dir.path().join("models/classifier.json")
        );
        assert_eq!(config.anomaly_path(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edgesense.toml");
        std::fs::write(
            &path,
            "[models]\nanomaly = \"/abs/anomaly.json\"\n\n[anomaly]\ncontamination = 0.05\n\n[dataset]\nseed = 7\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.anomaly.contamination, 0.05);
        assert_eq!(config.anomaly.n_estimators, 100);
        assert_eq!(config.dataset.split_options().seed, 7);
        assert_eq!(config.dataset.test_fraction, 0.15);
        assert_eq!(config.anomaly_path(), Some(PathBuf::from("/abs/anomaly.json")));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edgesense.toml");
        std::fs::write(&path, "[inference\nparallel_batches = yes").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseToml { .. })
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/edgesense.toml");
        let mut config = Config::default();
        config.inference.serialize_classifier = true;
        config.dataset.val_fraction = 0.2;
        config.save_to(&path).unwrap();
        let mut loaded = Config::load_from(&path).unwrap();
        loaded.base_dir = None;
        assert_eq!(loaded, config);
    }
}
