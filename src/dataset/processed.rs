//! Processed feature arrays: `X_<split>.f32`, `y_<split>.u8` and `manifest.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::DatasetError;
use super::split::Split;
use crate::analysis::{FEATURE_BINS, FeatureTensor};
use crate::labels::DiseaseLabel;

pub const PROCESSED_FORMAT_VERSION: i64 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

/// Feature rows and labels of one split; row `i` is a flattened `(T, 248, 1)` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSplit {
    time_frames: usize,
    values: Vec<f32>,
    labels: Vec<DiseaseLabel>,
}

impl ProcessedSplit {
    pub fn new(time_frames: usize) -> Self {
        Self {
            time_frames,
            values: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn push(&mut self, tensor: &FeatureTensor, label: DiseaseLabel) -> Result<(), DatasetError> {
        if tensor.time_frames() != self.time_frames {
            return Err(DatasetError::SizeMismatch(format!(
                "tensor has {} frames, split stores {}",
                tensor.time_frames(),
                self.time_frames
            )));
        }
        self.values.extend(tensor.view().iter().copied());
        self.labels.push(label);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn time_frames(&self) -> usize {
        self.time_frames
    }

    pub fn row_len(&self) -> usize {
        self.time_frames * FEATURE_BINS
    }

    pub fn labels(&self) -> &[DiseaseLabel] {
        &self.labels
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        let len = self.row_len();
        self.values.get(idx * len..(idx + 1) * len)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.row_len().max(1))
    }

    pub fn tensor(&self, idx: usize) -> Option<FeatureTensor> {
        let row = self.row(idx)?;
        FeatureTensor::from_flat(row.to_vec(), self.time_frames).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedManifest {
    pub format_version: i64,
    pub time_frames: usize,
    pub feature_bins: usize,
    pub counts: BTreeMap<Split, usize>,
    pub labels: Vec<DiseaseLabel>,
}

/// Train, validation and test arrays written together.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDataset {
    pub train: ProcessedSplit,
    pub val: ProcessedSplit,
    pub test: ProcessedSplit,
}

impl ProcessedDataset {
    pub fn new(time_frames: usize) -> Self {
        Self {
            train: ProcessedSplit::new(time_frames),
            val: ProcessedSplit::new(time_frames),
            test: ProcessedSplit::new(time_frames),
        }
    }

    pub fn split(&self, split: Split) -> &ProcessedSplit {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn split_mut(&mut self, split: Split) -> &mut ProcessedSplit {
        match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
            Split::Test => &mut self.test,
        }
    }

    pub fn manifest(&self) -> ProcessedManifest {
        ProcessedManifest {
            format_version: PROCESSED_FORMAT_VERSION,
            time_frames: self.train.time_frames,
            feature_bins: FEATURE_BINS,
            counts: Split::ALL
                .into_iter()
                .map(|split| (split, self.split(split).len()))
                .collect(),
            labels: DiseaseLabel::ALL.to_vec(),
        }
    }

    /// Write all arrays and the manifest into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<(), DatasetError> {
        fs::create_dir_all(dir)?;
        for split in Split::ALL {
            let data = self.split(split);
            let mut bytes = Vec::with_capacity(data.values.len() * 4);
            for v in &data.values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            fs::write(dir.join(features_file(split)), bytes)?;
            let labels: Vec<u8> = data.labels.iter().map(|label| label.index() as u8).collect();
            fs::write(dir.join(labels_file(split)), labels)?;
        }
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&self.manifest())?,
        )?;
        info!(
            dir = %dir.display(),
            train = self.train.len(),
            val = self.val.len(),
            test = self.test.len(),
            "wrote processed dataset"
        );
        Ok(())
    }

    /// Read a directory written by [`ProcessedDataset::write`].
    pub fn read(dir: &Path) -> Result<Self, DatasetError> {
        let manifest: ProcessedManifest =
            serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;
        if manifest.format_version != PROCESSED_FORMAT_VERSION {
            return Err(DatasetError::InvalidManifest(format!(
                "unsupported format_version {}",
                manifest.format_version
            )));
        }
        if manifest.feature_bins != FEATURE_BINS || manifest.time_frames == 0 {
            return Err(DatasetError::InvalidManifest(format!(
                "unsupported tensor shape ({}, {})",
                manifest.time_frames, manifest.feature_bins
            )));
        }
        if manifest.labels.as_slice() != DiseaseLabel::ALL.as_slice() {
            return Err(DatasetError::InvalidManifest(
                "label order differs from the classifier output order".to_string(),
            ));
        }
        let mut dataset = Self::new(manifest.time_frames);
        for split in Split::ALL {
            let expected = manifest.counts.get(&split).copied().unwrap_or(0);
            let values = read_f32le(&dir.join(features_file(split)))?;
            let labels = fs::read(dir.join(labels_file(split)))?
                .into_iter()
                .map(|idx| {
                    DiseaseLabel::from_index(idx as usize).ok_or_else(|| {
                        DatasetError::InvalidManifest(format!("label index {idx} out of range"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let target = dataset.split_mut(split);
            if labels.len() != expected || values.len() != expected * target.row_len() {
                return Err(DatasetError::SizeMismatch(format!(
                    "{split}: manifest lists {expected} rows, found {} labels and {} values",
                    labels.len(),
                    values.len()
                )));
            }
            target.values = values;
            target.labels = labels;
        }
        Ok(dataset)
    }
}

fn features_file(split: Split) -> String {
    format!("X_{split}.f32")
}

fn labels_file(split: Split) -> String {
    format!("y_{split}.u8")
}

fn read_f32le(path: &Path) -> Result<Vec<f32>, DatasetError> {
    let bytes = fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(DatasetError::SizeMismatch(format!(
            "{} is not a whole number of f32 values",
            path.display()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tensor(frames: usize, fill: f32) -> FeatureTensor {
        FeatureTensor::from_flat(vec![fill; frames * FEATURE_BINS], frames).unwrap()
    }

    #[test]
    fn write_then_read_restores_rows_and_labels() {
        let dir = tempdir().unwrap();
        let mut dataset = ProcessedDataset::new(3);
        dataset.train.push(&tensor(3, 0.5), DiseaseLabel::Normal).unwrap();
        dataset.train.push(&tensor(3, -1.5), DiseaseLabel::Tuberculosis).unwrap();
        dataset.test.push(&tensor(3, 2.0), DiseaseLabel::Copd).unwrap();
        dataset.write(dir.path()).unwrap();

        let loaded = ProcessedDataset::read(dir.path()).unwrap();
        assert_eq!(loaded, dataset);
        assert_eq!(loaded.train.row(1).unwrap()[7], -1.5);
        assert!(loaded.val.is_empty());
        assert_eq!(loaded.test.tensor(0).unwrap(), tensor(3, 2.0));
        assert_eq!(loaded.manifest().counts[&Split::Train], 2);
    }

    #[test]
    fn frame_count_mismatch_is_rejected() {
        let mut split = ProcessedSplit::new(4);
        assert!(split.push(&tensor(3, 0.0), DiseaseLabel::Normal).is_err());
    }

    #[test]
    fn truncated_arrays_are_detected() {
        let dir = tempdir().unwrap();
        let mut dataset = ProcessedDataset::new(2);
        dataset.val.push(&tensor(2, 1.0), DiseaseLabel::Asthma).unwrap();
        dataset.write(dir.path()).unwrap();
        fs::write(dir.path().join("X_val.f32"), [0u8; 8]).unwrap();
        assert!(matches!(
            ProcessedDataset::read(dir.path()),
            Err(DatasetError::SizeMismatch(_))
        ));
    }
}
