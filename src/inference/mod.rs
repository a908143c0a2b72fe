//! Inference engine: normalize → extract → classify → decide.
//!
//! One [`InferenceEngine`] owns the read-only classifier and optional anomaly
//! detector. It holds no per-call state, so a single instance serves any
//! number of worker threads.

mod handle;
mod probabilities;
mod risk;

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{FEATURE_BINS, FeatureError, FeatureExtractor, FeatureTensor};
use crate::anomaly::{AnomalyDetector, AnomalyError};
use crate::audio::{self, AudioError, AudioLoadError, NormalizedAudio, RawAudio};
use crate::classifier::{Classifier, ClassifierError, has_canonical_labels};
use crate::labels::{DiseaseLabel, LABEL_COUNT};

pub use handle::EngineHandle;
pub use probabilities::ClassProbabilities;
pub use risk::{HIGH_RISK_CONFIDENCE, MEDIUM_RISK_CONFIDENCE, RiskLevel, risk_level};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Audio input is empty")]
    EmptyInput,
    #[error(transparent)]
    AudioLoad(#[from] AudioLoadError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Anomaly(#[from] AnomalyError),
}

/// Outcome of one inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction: DiseaseLabel,
    pub confidence: f32,
    pub probabilities: ClassProbabilities,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f32>,
}

impl PredictionResult {
    /// Decide label, confidence and risk from a probability row.
    pub fn from_probabilities(probabilities: ClassProbabilities) -> Self {
        let (prediction, confidence) = probabilities.argmax();
        Self {
            prediction,
            confidence,
            probabilities,
            risk_level: risk_level(prediction, confidence),
            is_anomaly: None,
            anomaly_score: None,
        }
    }
}

pub struct InferenceEngine {
    extractor: FeatureExtractor,
    classifier: Box<dyn Classifier>,
    anomaly: Option<AnomalyDetector>,
}

impl InferenceEngine {
    /// Engine around `classifier`, checked against the feature tensor contract.
    pub fn new(classifier: Box<dyn Classifier>) -> Result<Self, InferenceError> {
        let (frames, bins, channels) = classifier.input_shape();
        if frames == 0 || bins != FEATURE_BINS || channels != 1 {
            return Err(InferenceError::ShapeMismatch {
                expected: format!("(T, {FEATURE_BINS}, 1)"),
                actual: format!("({frames}, {bins}, {channels})"),
            });
        }
        if !has_canonical_labels(classifier.labels()) {
            return Err(InferenceError::ShapeMismatch {
                expected: format!("{:?}", DiseaseLabel::ALL),
                actual: format!("{:?}", classifier.labels()),
            });
        }
        Ok(Self {
            extractor: FeatureExtractor::new()?,
            classifier,
            anomaly: None,
        })
    }

    /// Attach a fitted anomaly detector; results then carry the anomaly fields.
    pub fn with_anomaly(mut self, detector: AnomalyDetector) -> Result<Self, InferenceError> {
        if !detector.is_fitted() {
            return Err(AnomalyError::NotFitted.into());
        }
        info!(
            threshold = detector.threshold().unwrap_or_default(),
            "anomaly detector attached"
        );
        self.anomaly = Some(detector);
        Ok(self)
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn anomaly(&self) -> Option<&AnomalyDetector> {
        self.anomaly.as_ref()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Predict from raw samples at `sample_rate`.
    pub fn predict(&self, samples: &[f32], sample_rate: u32) -> Result<PredictionResult, InferenceError> {
        if samples.is_empty() {
            return Err(InferenceError::EmptyInput);
        }
        let normalized = audio::normalize(samples, sample_rate)?;
        self.predict_normalized(&normalized)
    }

    pub fn predict_raw(&self, audio: &RawAudio) -> Result<PredictionResult, InferenceError> {
        self.predict(&audio.samples, audio.sample_rate)
    }

    /// Decode `path` and predict.
    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult, InferenceError> {
        let raw = audio::decode_file(path)?;
        debug!(path = %path.display(), "predicting file");
        self.predict_raw(&raw)
    }

    pub fn predict_normalized(&self, audio: &NormalizedAudio) -> Result<PredictionResult, InferenceError> {
        let tensor = self.extractor.extract(audio)?;
        self.predict_tensor(&tensor)
    }

    /// Classify an already-extracted tensor and attach the anomaly verdict.
    pub fn predict_tensor(&self, tensor: &FeatureTensor) -> Result<PredictionResult, InferenceError> {
        let expected = self.classifier.input_shape();
        if tensor.shape() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", tensor.shape()),
            });
        }
        let batch = tensor.with_batch_axis();
        let output = self.classifier.predict(batch.view())?;
        let (rows, width) = output.dim();
        if rows != 1 || width != LABEL_COUNT {
            return Err(InferenceError::ShapeMismatch {
                expected: format!("(1, {LABEL_COUNT})"),
                actual: format!("({rows}, {width})"),
            });
        }
        let row = output.row(0).to_vec();
        let probabilities =
            ClassProbabilities::from_row(&row).map_err(ClassifierError::Runtime)?;
        let mut result = PredictionResult::from_probabilities(probabilities);
        if let Some(detector) = &self.anomaly {
            let verdict = detector.evaluate(tensor)?;
            result.is_anomaly = Some(verdict.is_anomaly());
            result.anomaly_score = Some(verdict.score);
        }
        debug!(
            prediction = %result.prediction,
            confidence = result.confidence,
            risk = %result.risk_level,
            "prediction complete"
        );
        Ok(result)
    }

    /// Predict each clip in order; a failing clip becomes an error entry.
    pub fn predict_batch<S: AsRef<[f32]>>(
        &self,
        clips: &[S],
        sample_rate: u32,
    ) -> Vec<Result<PredictionResult, InferenceError>> {
        clips
            .iter()
            .map(|clip| self.predict(clip.as_ref(), sample_rate))
            .collect()
    }

    /// [`InferenceEngine::predict_batch`] spread over the rayon pool; output order matches input.
    pub fn predict_batch_parallel<S: AsRef<[f32]> + Sync>(
        &self,
        clips: &[S],
        sample_rate: u32,
    ) -> Vec<Result<PredictionResult, InferenceError>> {
        clips
            .par_iter()
            .map(|clip| self.predict(clip.as_ref(), sample_rate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CANONICAL_TIME_FRAMES;
    use crate::anomaly::AnomalyOptions;
    use crate::audio::TARGET_SAMPLE_RATE;
    use ndarray::{Array2, ArrayView4};
    use std::sync::Arc;

    struct FixedRow(Vec<f32>);

    impl Classifier for FixedRow {
        fn input_shape(&self) -> (usize, usize, usize) {
            (CANONICAL_TIME_FRAMES, FEATURE_BINS, 1)
        }

        fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
            let items = batch.dim().0;
            let width = self.0.len();
            Ok(Array2::from_shape_fn((items, width), |(_, c)| self.0[c]))
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn input_shape(&self) -> (usize, usize, usize) {
            (CANONICAL_TIME_FRAMES, FEATURE_BINS, 1)
        }

        fn predict(&self, _batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
            Err(ClassifierError::Runtime("boom".to_string()))
        }
    }

    fn engine_with(row: &[f32]) -> InferenceEngine {
        InferenceEngine::new(Box::new(FixedRow(row.to_vec()))).unwrap()
    }

    fn tone(len: usize, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.3)
            .collect()
    }

    #[test]
    fn predicts_argmax_with_risk() {
        let engine = engine_with(&[0.05, 0.85, 0.02, 0.02, 0.02, 0.02, 0.02]);
        let result = engine.predict(&tone(8000, 8000), 8000).unwrap();
        assert_eq!(result.prediction, DiseaseLabel::Asthma);
        assert!((result.confidence - 0.85).abs() < 1e-6);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!((result.probabilities.sum() - 1.0).abs() < 1e-5);
        assert_eq!(result.is_anomaly, None);
        assert_eq!(result.anomaly_score, None);
    }

    #[test]
    fn ties_pick_the_lowest_index() {
        let engine = engine_with(&[0.1, 0.1, 0.35, 0.35, 0.05, 0.05, 0.0]);
        let result = engine.predict(&tone(16_000, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(result.prediction, DiseaseLabel::Copd);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn empty_audio_is_rejected() {
        let engine = engine_with(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            engine.predict(&[], TARGET_SAMPLE_RATE),
            Err(InferenceError::EmptyInput)
        ));
        assert!(matches!(
            engine.predict(&[0.1, 0.2], 0),
            Err(InferenceError::Audio(AudioError::InvalidSampleRate(0)))
        ));
    }

    #[test]
    fn wrong_output_width_is_a_shape_mismatch() {
        let engine = engine_with(&[0.5, 0.5]);
        assert!(matches!(
            engine.predict(&tone(4000, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn tensor_shape_is_checked_before_the_call() {
        let engine = engine_with(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let short = FeatureTensor::from_flat(vec![0.0; 10 * FEATURE_BINS], 10).unwrap();
        assert!(matches!(
            engine.predict_tensor(&short),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn classifier_errors_propagate() {
        let engine = InferenceEngine::new(Box::new(Failing)).unwrap();
        assert!(matches!(
            engine.predict(&tone(4000, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE),
            Err(InferenceError::Classifier(ClassifierError::Runtime(_)))
        ));
    }

    #[test]
    fn batch_reports_failures_in_place() {
        let engine = engine_with(&[0.9, 0.02, 0.02, 0.02, 0.02, 0.01, 0.01]);
        let clips = vec![tone(4000, TARGET_SAMPLE_RATE), Vec::new(), tone(9000, TARGET_SAMPLE_RATE)];
        let results = engine.predict_batch(&clips, TARGET_SAMPLE_RATE);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(InferenceError::EmptyInput)));
        assert_eq!(results[2].as_ref().unwrap().prediction, DiseaseLabel::Normal);

        let parallel = engine.predict_batch_parallel(&clips, TARGET_SAMPLE_RATE);
        assert_eq!(parallel.len(), 3);
        assert_eq!(parallel[0].as_ref().unwrap(), results[0].as_ref().unwrap());
        assert!(parallel[1].is_err());
    }

    #[test]
    fn anomaly_fields_are_attached_when_configured() {
        let engine = engine_with(&[0.2, 0.7, 0.02, 0.02, 0.02, 0.02, 0.02]);
        let corpus: Vec<FeatureTensor> = (0..12)
            .map(|i| {
                let audio = audio::normalize(&tone(8000 + i * 500, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE).unwrap();
                engine.extractor().extract(&audio).unwrap()
            })
            .collect();
        let mut detector = AnomalyDetector::new(AnomalyOptions {
            n_estimators: 20,
            ..AnomalyOptions::default()
        })
        .unwrap();
        detector.fit(&corpus).unwrap();
        let engine = engine.with_anomaly(detector).unwrap();
        let result = engine.predict(&tone(8000, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE).unwrap();
        assert!(result.is_anomaly.is_some());
        let score = result.anomaly_score.unwrap();
        assert!((-1.0..0.0).contains(&score));
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn unfitted_detector_is_refused() {
        let engine = engine_with(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            engine.with_anomaly(AnomalyDetector::default()),
            Err(InferenceError::Anomaly(AnomalyError::NotFitted))
        ));
    }

    #[test]
    fn mismatched_input_shape_is_refused_at_construction() {
        struct Narrow;
        impl Classifier for Narrow {
            fn input_shape(&self) -> (usize, usize, usize) {
                (CANONICAL_TIME_FRAMES, 128, 1)
            }
            fn predict(&self, _batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
                unreachable!()
            }
        }
        assert!(matches!(
            InferenceEngine::new(Box::new(Narrow)),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn result_serializes_to_response_shape() {
        let engine = engine_with(&[0.99, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let result = engine.predict(&tone(4000, TARGET_SAMPLE_RATE), TARGET_SAMPLE_RATE).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["prediction"], "Normal");
        assert_eq!(value["risk_level"], "Low");
        assert_eq!(value["probabilities"].as_object().unwrap().len(), LABEL_COUNT);
        assert!(value.get("is_anomaly").is_none());
    }

    #[test]
    fn handle_swaps_engines_without_disturbing_snapshots() {
        let handle = EngineHandle::new(engine_with(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        let before: Arc<InferenceEngine> = handle.get();
        handle.swap(engine_with(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]));
        let clip = tone(4000, TARGET_SAMPLE_RATE);
        assert_eq!(before.predict(&clip, TARGET_SAMPLE_RATE).unwrap().prediction, DiseaseLabel::Normal);
        assert_eq!(
            handle.get().predict(&clip, TARGET_SAMPLE_RATE).unwrap().prediction,
            DiseaseLabel::LongCovid
        );
    }
}
