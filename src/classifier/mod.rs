//! Classifier collaborator interface.
//!
//! The engine only needs "a model with a fixed input shape and a softmax over
//! the seven labels". Trained networks plug in by implementing [`Classifier`];
//! [`PooledLogRegClassifier`] is the bundled JSON baseline.

mod logreg;

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use thiserror::Error;

use crate::labels::{DiseaseLabel, LABEL_COUNT};

pub use logreg::{CLASSIFIER_MODEL_VERSION, PooledLogRegClassifier};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Invalid classifier model: {0}")]
    InvalidModel(String),
    #[error("Classifier input shape {actual:?} does not match {expected:?}")]
    InputShape {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    #[error("Classifier runtime failed: {0}")]
    Runtime(String),
    #[error("Classifier model I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Classifier model JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// A loaded model mapping `(batch, T, 248, 1)` tensors to `(batch, 7)` probabilities.
///
/// Implementations are shared read-only between worker threads.
pub trait Classifier: Send + Sync {
    /// `(time_frames, feature_bins, channels)` of one input item.
    fn input_shape(&self) -> (usize, usize, usize);

    /// Output column order.
    fn labels(&self) -> &[DiseaseLabel] {
        &DiseaseLabel::ALL
    }

    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn input_shape(&self) -> (usize, usize, usize) {
        (**self).input_shape()
    }

    fn labels(&self) -> &[DiseaseLabel] {
        (**self).labels()
    }

    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        (**self).predict(batch)
    }
}

/// Single acquisition point for runtimes that cannot run concurrent inference.
pub struct SerializedClassifier<C> {
    input_shape: (usize, usize, usize),
    labels: Vec<DiseaseLabel>,
    inner: Mutex<C>,
}

impl<C: Classifier> SerializedClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self {
            input_shape: inner.input_shape(),
            labels: inner.labels().to_vec(),
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: Classifier> Classifier for SerializedClassifier<C> {
    fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    fn labels(&self) -> &[DiseaseLabel] {
        &self.labels
    }

    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| ClassifierError::Runtime("classifier lock poisoned".to_string()))?;
        guard.predict(batch)
    }
}

/// Numerically stable softmax; all-`-inf` or empty input yields a uniform row.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps: Vec<f32> = raw.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum == 0.0 {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

/// Load the JSON baseline at `path`, optionally behind a [`SerializedClassifier`].
pub fn load_classifier(path: &Path, serialize: bool) -> Result<Box<dyn Classifier>, ClassifierError> {
    let model = PooledLogRegClassifier::load_json(path)?;
    let classifier: Box<dyn Classifier> = if serialize {
        Box::new(SerializedClassifier::new(model))
    } else {
        Box::new(model)
    };
    Ok(classifier)
}

/// True when `labels` is exactly the fixed output order.
pub fn has_canonical_labels(labels: &[DiseaseLabel]) -> bool {
    labels.len() == LABEL_COUNT && labels.iter().zip(DiseaseLabel::ALL).all(|(a, b)| *a == b)
}
