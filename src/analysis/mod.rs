//! Feature extraction for the classifier input and diagnostic features.
//!
//! The recipe is fixed: centered STFT (periodic Hann, `n_fft` 2048, hop 160)
//! → Slaney mel bank (128 bands, 20-8000 Hz) → dB → orthonormal DCT (40 MFCC)
//! plus Δ/ΔΔ, stacked with the log-mel spectrogram into a `(T, 248, 1)`
//! [`FeatureTensor`]. Every function here is deterministic.

mod bundle;
mod cadence;
pub(crate) mod fft;
mod mel;
mod mfcc;
mod spectral;
mod stft;
mod stretch;
mod tensor;

use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use crate::audio::{NormalizedAudio, TARGET_LEN, TARGET_SAMPLE_RATE};

pub use bundle::{FeatureBundle, FeatureRequest};
pub use cadence::{BreathingCadence, breathing_cadence};
pub use mfcc::DELTA_WIDTH;
pub use spectral::{CHROMA_BINS, SpectralFeatures, SpectralSummary, Stats, zero_crossing_rate};
pub use stft::centered_frame_count;
pub use stretch::{STRETCH_HOP, STRETCH_N_FFT, time_stretch};
pub use tensor::FeatureTensor;

use fft::{FftPlan, periodic_hann_window};
use mel::MelBank;
use mfcc::{DbReference, DctBasis, power_to_db, stack_with_deltas};

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 160;
pub const N_MFCC: usize = 40;
pub const N_MELS: usize = 128;
pub const FMIN_HZ: f32 = 20.0;
pub const FMAX_HZ: f32 = 8_000.0;
/// MFCC + Δ + ΔΔ rows.
pub const CEPSTRAL_BINS: usize = 3 * N_MFCC;
/// Feature rows of the classifier input.
pub const FEATURE_BINS: usize = CEPSTRAL_BINS + N_MELS;
/// Time frames of a canonical 3 s window.
pub const CANONICAL_TIME_FRAMES: usize = 1 + TARGET_LEN / HOP_LENGTH;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("FFT failed: {0}")]
    Fft(String),
    #[error("Invalid feature input: {0}")]
    InvalidInput(String),
}

/// Precomputed window, FFT plan, mel bank and DCT basis for the fixed recipe.
///
/// Immutable after construction and safe to share between threads.
pub struct FeatureExtractor {
    window: Vec<f32>,
    plan: FftPlan,
    mel_bank: MelBank,
    dct: DctBasis,
    freqs: Vec<f64>,
    chroma_classes: Vec<Option<usize>>,
}

impl FeatureExtractor {
    pub fn new() -> Result<Self, FeatureError> {
        let plan = FftPlan::new(N_FFT).map_err(FeatureError::Fft)?;
        let freqs = spectral::bin_frequencies(TARGET_SAMPLE_RATE, N_FFT);
        let chroma_classes = spectral::chroma_classes(&freqs);
        Ok(Self {
            window: periodic_hann_window(N_FFT),
            plan,
            mel_bank: MelBank::new(TARGET_SAMPLE_RATE, N_FFT, N_MELS, FMIN_HZ, FMAX_HZ),
            dct: DctBasis::new(N_MFCC, N_MELS),
            freqs,
            chroma_classes,
        })
    }

    /// Classifier input tensor for a canonical window.
    pub fn extract(&self, audio: &NormalizedAudio) -> Result<FeatureTensor, FeatureError> {
        self.extract_samples(audio.samples())
    }

    /// Classifier input tensor for 16 kHz samples of any length.
    pub fn extract_samples(&self, samples: &[f32]) -> Result<FeatureTensor, FeatureError> {
        let mel = self.mel_power(samples)?;
        let cepstral = stack_with_deltas(&self.mfcc_from_mel(&mel));
        let log_mel = power_to_db(&mel, DbReference::Max);
        let tensor = FeatureTensor::from_blocks(&cepstral, &log_mel)?;
        debug!(
            samples = samples.len(),
            time_frames = tensor.time_frames(),
            "extracted feature tensor"
        );
        Ok(tensor)
    }

    /// `(1025, T)` power spectrogram.
    pub fn power_spectrogram(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        stft::centered_power_spectrogram(samples, &self.plan, &self.window, HOP_LENGTH)
    }

    /// `(128, T)` mel power spectrogram.
    pub fn mel_power(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        Ok(self.mel_bank.apply(&self.power_spectrogram(samples)?))
    }

    /// `(40, T)` MFCC.
    pub fn mfcc(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        Ok(self.mfcc_from_mel(&self.mel_power(samples)?))
    }

    /// `(120, T)` MFCC stacked with first and second deltas.
    pub fn mfcc_with_deltas(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        Ok(stack_with_deltas(&self.mfcc(samples)?))
    }

    /// `(128, T)` log-mel spectrogram in dB relative to the loudest cell.
    pub fn log_mel_spectrogram(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        Ok(power_to_db(&self.mel_power(samples)?, DbReference::Max))
    }

    pub fn spectral_features(&self, samples: &[f32]) -> Result<SpectralFeatures, FeatureError> {
        Ok(self.spectral_from_power(samples, &self.power_spectrogram(samples)?))
    }

    /// `(12, T)` chroma, each frame scaled so its strongest pitch class is 1.
    pub fn chroma(&self, samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
        Ok(spectral::chroma_from_power(
            &self.power_spectrogram(samples)?,
            &self.chroma_classes,
        ))
    }

    /// Compute the requested diagnostic features, sharing one STFT between them.
    pub fn bundle(
        &self,
        audio: &NormalizedAudio,
        request: FeatureRequest,
    ) -> Result<FeatureBundle, FeatureError> {
        let samples = audio.samples();
        let mut bundle = FeatureBundle::default();
        let needs_power =
            request.mfcc || request.mel_spectrogram || request.chroma || request.spectral;
        if needs_power {
            let power = self.power_spectrogram(samples)?;
            if request.mfcc || request.mel_spectrogram {
                let mel = self.mel_bank.apply(&power);
                if request.mfcc {
                    bundle.mfcc = Some(stack_with_deltas(&self.mfcc_from_mel(&mel)));
                }
                if request.mel_spectrogram {
                    bundle.mel_spectrogram = Some(power_to_db(&mel, DbReference::Max));
                }
            }
            if request.chroma {
                bundle.chroma = Some(spectral::chroma_from_power(&power, &self.chroma_classes));
            }
            if request.spectral {
                bundle.spectral = Some(self.spectral_from_power(samples, &power));
            }
        }
        if request.breathing {
            bundle.breathing = Some(breathing_cadence(samples, audio.sample_rate()));
        }
        Ok(bundle)
    }

    fn mfcc_from_mel(&self, mel: &Array2<f32>) -> Array2<f32> {
        self.dct.apply(&power_to_db(mel, DbReference::Unit))
    }

    fn spectral_from_power(&self, samples: &[f32], power: &Array2<f32>) -> SpectralFeatures {
        let magnitude = power.mapv(f32::sqrt);
        let (centroid_hz, rolloff_hz, bandwidth_hz) =
            spectral::shape_descriptors(&magnitude, &self.freqs);
        SpectralFeatures {
            centroid_hz,
            rolloff_hz,
            bandwidth_hz,
            zero_crossing_rate: zero_crossing_rate(samples, N_FFT, HOP_LENGTH),
        }
    }
}

/// One-shot extraction with a freshly built [`FeatureExtractor`].
pub fn extract_features(audio: &NormalizedAudio) -> Result<FeatureTensor, FeatureError> {
    FeatureExtractor::new()?.extract(audio)
}
