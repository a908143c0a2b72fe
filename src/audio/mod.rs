//! Audio ingestion: decoding, resampling and fixed-window normalization.
//!
//! Every path into the classifier goes through [`normalize`], so training-time
//! ingestion and inference see byte-identical canonical windows.

mod decode;
mod normalize;
mod resample;

use std::path::Path;

use thiserror::Error;

pub use decode::{AudioLoadError, decode_bytes, decode_file};
pub use normalize::normalize;
pub use resample::resample;

/// Sample rate of the canonical analysis window.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
/// Duration of the canonical analysis window.
pub const TARGET_DURATION_SECONDS: f64 = 3.0;
/// `round(TARGET_SAMPLE_RATE * TARGET_DURATION_SECONDS)`.
pub const TARGET_LEN: usize = 48_000;

/// Errors raised by the pure normalization stage.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A sample rate of zero cannot describe any signal.
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),
    /// The band-limited resampler rejected the conversion.
    #[error("Resampling {from} Hz -> {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },
}

/// Decoded mono audio at its native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds, or zero for an invalid sample rate.
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Canonical analysis window: 16 kHz, exactly [`TARGET_LEN`] samples, peak <= 1.
///
/// Only [`normalize`] (and the crate's own fixture helpers) can build one, so a
/// value of this type always satisfies the length and amplitude invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAudio {
    samples: Vec<f32>,
}

impl NormalizedAudio {
    pub(crate) fn from_canonical(samples: Vec<f32>) -> Self {
        debug_assert_eq!(samples.len(), TARGET_LEN);
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&sample| sample == 0.0)
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Errors from the combined decode + normalize path used by dataset loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] AudioLoadError),
    #[error(transparent)]
    Normalize(#[from] AudioError),
}

/// Decode a file and bring it to the canonical window.
pub fn load_normalized(path: &Path) -> Result<NormalizedAudio, LoadError> {
    let raw = decode_file(path)?;
    Ok(normalize(&raw.samples, raw.sample_rate)?)
}
