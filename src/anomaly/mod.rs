//! Unsupervised novelty detection on flattened feature tensors.
//!
//! The detector is fitted once on known-normal recordings, persisted as a JSON
//! blob and loaded read-only at inference time. Refitting replaces the whole
//! model; there is no incremental update.

mod forest;
mod scaler;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::analysis::FeatureTensor;

use forest::{IsolationForest, ScaledRows, contamination_offset};
pub use scaler::StandardScaler;

/// Blob layout version written by [`AnomalyDetector::save`].
pub const ANOMALY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("Anomaly detector is not fitted; call fit() or load() first")]
    NotFitted,
    #[error("Anomaly detector needs at least one non-empty training sample")]
    EmptyInput,
    #[error("Feature length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Anomaly model I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anomaly model JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported anomaly model: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid anomaly options: {0}")]
    InvalidOptions(String),
}

/// Binary novelty label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyLabel {
    Normal,
    Anomaly,
}

/// Label and continuous score for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub label: AnomalyLabel,
    /// Lower is more anomalous.
    pub score: f32,
}

impl AnomalyVerdict {
    pub fn is_anomaly(&self) -> bool {
        self.label == AnomalyLabel::Anomaly
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyOptions {
    pub n_estimators: usize,
    /// Expected fraction of outliers in the training data; sets the decision threshold.
    pub contamination: f32,
    pub seed: u64,
    /// Rows drawn (without replacement) per tree; capped at the training size.
    pub max_samples: usize,
}

impl Default for AnomalyOptions {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            contamination: 0.1,
            seed: 42,
            max_samples: 256,
        }
    }
}

impl AnomalyOptions {
    pub fn validate(&self) -> Result<(), AnomalyError> {
        if self.n_estimators == 0 {
            return Err(AnomalyError::InvalidOptions(
                "n_estimators must be > 0".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(AnomalyError::InvalidOptions(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.max_samples == 0 {
            return Err(AnomalyError::InvalidOptions(
                "max_samples must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedModel {
    scaler: StandardScaler,
    forest: IsolationForest,
    /// Scores below this are anomalies.
    offset: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnomalyBlob {
    format_version: u32,
    options: AnomalyOptions,
    fitted: bool,
    #[serde(default)]
    model: Option<FittedModel>,
}

/// Standard scaler + isolation forest over flattened feature tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyDetector {
    options: AnomalyOptions,
    model: Option<FittedModel>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            options: AnomalyOptions::default(),
            model: None,
        }
    }
}

impl AnomalyDetector {
    pub fn new(options: AnomalyOptions) -> Result<Self, AnomalyError> {
        options.validate()?;
        Ok(Self {
            options,
            model: None,
        })
    }

    pub fn options(&self) -> &AnomalyOptions {
        &self.options
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Flattened length the fitted model expects.
    pub fn feature_len(&self) -> Option<usize> {
        self.model.as_ref().map(|model| model.scaler.dim())
    }

    /// Score threshold separating normal from anomalous samples.
    pub fn threshold(&self) -> Option<f32> {
        self.model.as_ref().map(|model| model.offset)
    }

    /// Fit on feature tensors of normal recordings.
    pub fn fit(&mut self, features: &[FeatureTensor]) -> Result<(), AnomalyError> {
        let rows: Vec<Vec<f32>> = features.iter().map(FeatureTensor::flatten).collect();
        self.fit_rows(&rows)
    }

    /// Fit on already-flattened rows of equal length.
    pub fn fit_rows(&mut self, rows: &[Vec<f32>]) -> Result<(), AnomalyError> {
        let dim = rows.first().map(Vec::len).ok_or(AnomalyError::EmptyInput)?;
        if dim == 0 {
            return Err(AnomalyError::EmptyInput);
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != dim) {
            return Err(AnomalyError::ShapeMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }
        let scaler = StandardScaler::fit(rows);
        let data = ScaledRows {
            rows,
            scaler: &scaler,
        };
        let forest = IsolationForest::fit(
            &data,
            self.options.n_estimators,
            self.options.max_samples,
            self.options.seed,
        );
        let training_scores: Vec<f32> = rows
            .iter()
            .map(|row| forest.score(&scaler.transform(row)))
            .collect();
        let offset = contamination_offset(&training_scores, self.options.contamination);
        info!(
            samples = rows.len(),
            dim,
            trees = forest.tree_count(),
            max_samples = forest.max_samples,
            offset,
            "fitted anomaly detector"
        );
        self.model = Some(FittedModel {
            scaler,
            forest,
            offset,
        });
        Ok(())
    }

    pub fn predict(&self, features: &FeatureTensor) -> Result<AnomalyLabel, AnomalyError> {
        Ok(self.evaluate_row(&features.flatten())?.label)
    }

    /// Continuous score in `[-1, 0)`; lower is more anomalous.
    pub fn score_samples(&self, features: &FeatureTensor) -> Result<f32, AnomalyError> {
        Ok(self.evaluate_row(&features.flatten())?.score)
    }

    /// Label and score from a single pass.
    pub fn evaluate(&self, features: &FeatureTensor) -> Result<AnomalyVerdict, AnomalyError> {
        self.evaluate_row(&features.flatten())
    }

    pub fn evaluate_row(&self, row: &[f32]) -> Result<AnomalyVerdict, AnomalyError> {
        let model = self.model.as_ref().ok_or(AnomalyError::NotFitted)?;
        let expected = model.scaler.dim();
        if row.len() != expected {
            return Err(AnomalyError::ShapeMismatch {
                expected,
                actual: row.len(),
            });
        }
        let score = model.forest.score(&model.scaler.transform(row));
        let label = if score < model.offset {
            AnomalyLabel::Anomaly
        } else {
            AnomalyLabel::Normal
        };
        Ok(AnomalyVerdict { label, score })
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, AnomalyError> {
        let blob = AnomalyBlob {
            format_version: ANOMALY_FORMAT_VERSION,
            options: self.options.clone(),
            fitted: self.model.is_some(),
            model: self.model.clone(),
        };
        Ok(serde_json::to_vec(&blob)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, AnomalyError> {
        let blob: AnomalyBlob = serde_json::from_slice(bytes)?;
        if blob.format_version != ANOMALY_FORMAT_VERSION {
            return Err(AnomalyError::UnsupportedFormat(format!(
                "format_version {} (expected {ANOMALY_FORMAT_VERSION})",
                blob.format_version
            )));
        }
        blob.options.validate()?;
        let model = match (blob.fitted, blob.model) {
            (true, Some(model)) => {
                model
                    .scaler
                    .validate()
                    .and_then(|_| model.forest.validate(model.scaler.dim()))
                    .map_err(AnomalyError::UnsupportedFormat)?;
                Some(model)
            }
            (false, _) => None,
            (true, None) => {
                return Err(AnomalyError::UnsupportedFormat(
                    "blob marked fitted but has no model".to_string(),
                ));
            }
        };
        Ok(Self {
            options: blob.options,
            model,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AnomalyError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_bytes()?)?;
        info!(path = %path.display(), fitted = self.is_fitted(), "saved anomaly detector");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AnomalyError> {
        let bytes = std::fs::read(path)?;
        let detector = Self::from_json_slice(&bytes)?;
        info!(path = %path.display(), fitted = detector.is_fitted(), "loaded anomaly detector");
        Ok(detector)
    }
}
