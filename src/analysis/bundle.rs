use ndarray::Array2;

use super::cadence::BreathingCadence;
use super::spectral::SpectralFeatures;

/// Which diagnostic feature kinds to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureRequest {
    pub mfcc: bool,
    pub mel_spectrogram: bool,
    pub chroma: bool,
    pub spectral: bool,
    pub breathing: bool,
}

impl FeatureRequest {
    pub fn all() -> Self {
        Self {
            mfcc: true,
            mel_spectrogram: true,
            chroma: true,
            spectral: true,
            breathing: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.mfcc || self.mel_spectrogram || self.chroma || self.spectral || self.breathing)
    }
}

/// Diagnostic features of one clip; a field is `Some` only when requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBundle {
    /// `(120, T)`: MFCC, Δ, ΔΔ.
    pub mfcc: Option<Array2<f32>>,
    /// `(128, T)` log-mel in dB relative to the clip maximum.
    pub mel_spectrogram: Option<Array2<f32>>,
    /// `(12, T)` pitch-class energy.
    pub chroma: Option<Array2<f32>>,
    pub spectral: Option<SpectralFeatures>,
    pub breathing: Option<BreathingCadence>,
}
