//! Respiratory condition screening from short breathing and cough recordings.
//!
//! Audio is brought to a canonical 16 kHz, 3 s window ([`audio`]), turned into
//! a `(T, 248, 1)` MFCC + log-mel tensor ([`analysis`]), classified into seven
//! labels ([`classifier`]) and wrapped with a risk level and an optional
//! novelty verdict ([`inference`], [`anomaly`]).

pub mod analysis;
pub mod anomaly;
pub mod app_dirs;
pub mod audio;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod labels;
pub mod logging;
pub mod metrics;

pub use analysis::{FeatureExtractor, FeatureTensor, extract_features};
pub use audio::{NormalizedAudio, RawAudio, normalize};
pub use inference::{EngineHandle, InferenceEngine, PredictionResult, RiskLevel};
pub use labels::DiseaseLabel;
