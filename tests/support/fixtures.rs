use std::f32::consts::TAU;
use std::path::Path;

use edgesense::analysis::{CANONICAL_TIME_FRAMES, FEATURE_BINS};
use edgesense::classifier::{Classifier, ClassifierError};
use edgesense::labels::LABEL_COUNT;
use ndarray::{Array2, ArrayView4, Axis};

pub fn sine(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    (0..len)
        .map(|i| (i as f32 * freq * TAU / sample_rate as f32).sin() * amplitude)
        .collect()
}

/// Breathing-like noise bursts: `rate_hz` amplitude bumps on a tone carrier.
pub fn breathing(sample_rate: u32, seconds: f32, rate_hz: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = 0.5 * (1.0 - (TAU * rate_hz * t).cos());
            envelope * (TAU * 350.0 * t).sin()
        })
        .collect()
}

pub fn write_wav_f32(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create wav parent dirs");
    }
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav writer");
    for &sample in samples {
        for _ in 0..channels {
            writer.write_sample(sample).expect("write wav sample");
        }
    }
    writer.finalize().expect("finalize wav");
}

/// Scores each label by the mean of one feature row over time, then normalizes.
pub struct RowEnergyClassifier;

impl Classifier for RowEnergyClassifier {
    fn input_shape(&self) -> (usize, usize, usize) {
        (CANONICAL_TIME_FRAMES, FEATURE_BINS, 1)
    }

    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let mut out = Array2::<f32>::zeros((batch.dim().0, LABEL_COUNT));
        for (item, mut row) in batch.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            for (class, slot) in row.iter_mut().enumerate() {
                let band = 120 + class * 16;
                let mean = item.index_axis(Axis(1), band).mean().unwrap_or(-80.0);
                *slot = (mean + 81.0).max(1e-3);
            }
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        Ok(out)
    }
}
