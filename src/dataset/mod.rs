//! Training-time ingestion: labeled clip loading, stratified splits,
//! augmentation and the processed feature arrays consumed by training.
//!
//! Clips go through the same [`crate::audio::normalize`] and
//! [`FeatureExtractor`] as inference.

mod augment;
mod loader;
mod processed;
mod split;

use std::path::PathBuf;

use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::analysis::{CANONICAL_TIME_FRAMES, FeatureError, FeatureExtractor, FeatureTensor};
use crate::audio::AudioError;
use crate::labels::DiseaseLabel;

pub use augment::{AugmentOptions, augment_clip};
pub use loader::{LabeledClip, load_directory, load_manifest_csv};
pub use processed::{
    MANIFEST_FILE, PROCESSED_FORMAT_VERSION, ProcessedDataset, ProcessedManifest, ProcessedSplit,
};
pub use split::{Split, SplitIndices, stratified_split};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unknown label {label:?} on manifest row {row}")]
    UnknownLabel { row: usize, label: String },
    #[error("Invalid split fractions: test {test}, val {val}")]
    InvalidSplitFractions { test: f64, val: f64 },
    #[error("Invalid processed manifest: {0}")]
    InvalidManifest(String),
    #[error("Processed data size mismatch: {0}")]
    SizeMismatch(String),
    #[error("Dataset I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV manifest invalid: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Split settings for [`build_processed`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    pub test_fraction: f64,
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.15,
            val_fraction: 0.15,
            seed: 42,
        }
    }
}

/// Split `clips`, extract features in parallel and collect the processed arrays.
///
/// Augmentation, when given, applies to training clips only.
pub fn build_processed(
    clips: &[LabeledClip],
    extractor: &FeatureExtractor,
    split: &SplitOptions,
    augment: Option<&AugmentOptions>,
) -> Result<ProcessedDataset, DatasetError> {
    let labels: Vec<DiseaseLabel> = clips.iter().map(|clip| clip.label).collect();
    let indices = stratified_split(&labels, split.test_fraction, split.val_fraction, split.seed)?;
    let mut dataset = ProcessedDataset::new(CANONICAL_TIME_FRAMES);
    for which in Split::ALL {
        let members = indices.get(which);
        let mut audio = Vec::with_capacity(members.len());
        match augment.filter(|_| which == Split::Train) {
            Some(options) => {
                let mut rng = options.rng();
                for &idx in members {
                    for variant in augment_clip(&clips[idx].audio, &mut rng, options)? {
                        audio.push((variant, clips[idx].label));
                    }
                }
            }
            None => audio.extend(
                members
                    .iter()
                    .map(|&idx| (clips[idx].audio.clone(), clips[idx].label)),
            ),
        }
        let tensors: Vec<(FeatureTensor, DiseaseLabel)> = audio
            .par_iter()
            .map(|(clip, label)| extractor.extract(clip).map(|tensor| (tensor, *label)))
            .collect::<Result<_, _>>()?;
        let target = dataset.split_mut(which);
        for (tensor, label) in &tensors {
            target.push(tensor, *label)?;
        }
        info!(split = %which, rows = target.len(), "extracted split features");
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{self, TARGET_SAMPLE_RATE};

    fn clip(label: DiseaseLabel, freq: f32) -> LabeledClip {
        let samples: Vec<f32> = (0..4000)
            .map(|i| (i as f32 * freq * std::f32::consts::TAU / TARGET_SAMPLE_RATE as f32).sin())
            .collect();
        LabeledClip {
            path: PathBuf::from(format!("{label}-{freq}.wav")),
            label,
            audio: audio::normalize(&samples, TARGET_SAMPLE_RATE).unwrap(),
        }
    }

    #[test]
    fn builds_every_split_with_augmented_training_rows() {
        let clips: Vec<LabeledClip> = (0..6)
            .flat_map(|i| {
                [
                    clip(DiseaseLabel::Normal, 200.0 + i as f32 * 50.0),
                    clip(DiseaseLabel::Asthma, 900.0 + i as f32 * 50.0),
                ]
            })
            .collect();
        let extractor = FeatureExtractor::new().unwrap();
        let split = SplitOptions {
            test_fraction: 1.0 / 6.0,
            val_fraction: 1.0 / 6.0,
            seed: 42,
        };
        let augment = AugmentOptions {
            stretch_rates: vec![0.9],
            pitch_semitones: Vec::new(),
            noise_std: 0.0,
            seed: 1,
        };
        let dataset = build_processed(&clips, &extractor, &split, Some(&augment)).unwrap();
        assert_eq!(dataset.test.len(), 2);
        assert_eq!(dataset.val.len(), 2);
        assert_eq!(dataset.train.len(), 8 * 2);
        assert_eq!(dataset.train.row_len(), CANONICAL_TIME_FRAMES * crate::analysis::FEATURE_BINS);
        let normals = dataset
            .train
            .labels()
            .iter()
            .filter(|&&label| label == DiseaseLabel::Normal)
            .count();
        assert_eq!(normals, 8);
    }
}
