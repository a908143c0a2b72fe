//! Time-pooled logistic regression over the 248 feature rows.

use std::path::Path;

use ndarray::{Array2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Classifier, ClassifierError, softmax};
use crate::analysis::{CANONICAL_TIME_FRAMES, FEATURE_BINS};
use crate::labels::{DiseaseLabel, LABEL_COUNT};

/// Model format version written by [`PooledLogRegClassifier::save_json`].
pub const CLASSIFIER_MODEL_VERSION: i64 = 1;

/// Versioned linear classifier on the time-mean of a feature tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledLogRegClassifier {
    #[serde(default)]
    pub model_id: Option<String>,
    pub model_version: i64,
    /// Time frames of the tensors the model was trained on.
    pub input_frames: usize,
    pub feature_bins: usize,
    pub classes: Vec<DiseaseLabel>,
    /// Row-major `[class][feature_bin]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub temperature: f32,
}

impl PooledLogRegClassifier {
    /// Zero-weight model: every input maps to the uniform distribution.
    pub fn bundled() -> Self {
        Self {
            model_id: None,
            model_version: CLASSIFIER_MODEL_VERSION,
            input_frames: CANONICAL_TIME_FRAMES,
            feature_bins: FEATURE_BINS,
            classes: DiseaseLabel::ALL.to_vec(),
            weights: vec![0.0; LABEL_COUNT * FEATURE_BINS],
            bias: vec![0.0; LABEL_COUNT],
            temperature: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        let invalid = |msg: String| Err(ClassifierError::InvalidModel(msg));
        if self.model_version != CLASSIFIER_MODEL_VERSION {
            return invalid(format!(
                "Unsupported model_version {} (expected {CLASSIFIER_MODEL_VERSION})",
                self.model_version
            ));
        }
        if self.feature_bins != FEATURE_BINS {
            return invalid(format!(
                "Unsupported feature_bins {} (expected {FEATURE_BINS})",
                self.feature_bins
            ));
        }
        if self.input_frames == 0 {
            return invalid("input_frames must be > 0".to_string());
        }
        if self.classes.as_slice() != DiseaseLabel::ALL.as_slice() {
            return invalid("classes must list the seven labels in canonical order".to_string());
        }
        if self.weights.len() != self.classes.len() * self.feature_bins {
            return invalid("weights length mismatch".to_string());
        }
        if self.bias.len() != self.classes.len() {
            return invalid("bias length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return invalid("temperature must be > 0".to_string());
        }
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, ClassifierError> {
        let bytes = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.validate()?;
        info!(
            path = %path.display(),
            model_id = model.model_id.as_deref().unwrap_or("unnamed"),
            "loaded classifier"
        );
        Ok(model)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ClassifierError> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Class probabilities for one time-pooled feature vector.
    pub fn predict_pooled(&self, pooled: &[f32]) -> Vec<f32> {
        let temp = self.temperature.max(1e-6);
        let logits: Vec<f32> = self
            .bias
            .iter()
            .enumerate()
            .map(|(class, &bias)| {
                let base = class * self.feature_bins;
                let dot: f32 = self.weights[base..base + self.feature_bins]
                    .iter()
                    .zip(pooled)
                    .map(|(w, x)| w * x)
                    .sum();
                (bias + dot) / temp
            })
            .collect();
        softmax(&logits)
    }
}

impl Classifier for PooledLogRegClassifier {
    fn input_shape(&self) -> (usize, usize, usize) {
        (self.input_frames, self.feature_bins, 1)
    }

    fn labels(&self) -> &[DiseaseLabel] {
        &self.classes
    }

    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let (items, frames, bins, channels) = batch.dim();
        let expected = self.input_shape();
        if (frames, bins, channels) != expected {
            return Err(ClassifierError::InputShape {
                expected,
                actual: (frames, bins, channels),
            });
        }
        let mut out = Array2::<f32>::zeros((items, self.classes.len()));
        for (item, mut row) in batch.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let pooled = item
                .index_axis(Axis(2), 0)
                .mean_axis(Axis(0))
                .ok_or_else(|| ClassifierError::Runtime("empty time axis".to_string()))?;
            let probs = self.predict_pooled(&pooled.to_vec());
            for (slot, p) in row.iter_mut().zip(probs) {
                *slot = p;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use tempfile::tempdir;

    #[test]
    fn bundled_model_is_uniform() {
        let model = PooledLogRegClassifier::bundled();
        model.validate().unwrap();
        let batch = Array4::<f32>::ones((2, CANONICAL_TIME_FRAMES, FEATURE_BINS, 1));
        let out = model.predict(batch.view()).unwrap();
        assert_eq!(out.dim(), (2, LABEL_COUNT));
        for p in out.iter() {
            assert!((p - 1.0 / 7.0).abs() < 1e-6);
        }
    }

    #[test]
    fn weights_steer_prediction() {
        let mut model = PooledLogRegClassifier::bundled();
        let copd = DiseaseLabel::Copd.index();
        model.weights[copd * FEATURE_BINS] = 5.0;
        let mut pooled = vec![0.0_f32; FEATURE_BINS];
        pooled[0] = 1.0;
        let probs = model.predict_pooled(&pooled);
        let best = probs
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
        assert_eq!(best.0, copd);
    }

    #[test]
    fn wrong_input_shape_is_rejected() {
        let model = PooledLogRegClassifier::bundled();
        let batch = Array4::<f32>::zeros((1, 10, FEATURE_BINS, 1));
        assert!(matches!(
            model.predict(batch.view()),
            Err(ClassifierError::InputShape { .. })
        ));
    }

    #[test]
    fn json_round_trip_preserves_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        let mut model = PooledLogRegClassifier::bundled();
        model.model_id = Some("baseline".to_string());
        model.bias[3] = 0.25;
        model.save_json(&path).unwrap();
        assert_eq!(PooledLogRegClassifier::load_json(&path).unwrap(), model);
    }

    #[test]
    fn reordered_classes_fail_validation() {
        let mut model = PooledLogRegClassifier::bundled();
        model.classes.swap(0, 1);
        assert!(matches!(
            model.validate(),
            Err(ClassifierError::InvalidModel(_))
        ));
    }
}
