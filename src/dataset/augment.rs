use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::DatasetError;
use crate::analysis::time_stretch;
use crate::audio::{self, NormalizedAudio, TARGET_SAMPLE_RATE};

/// Variants produced for each training clip, in addition to the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentOptions {
    /// Time-stretch rates; `0.9` slows the clip down without changing pitch.
    pub stretch_rates: Vec<f32>,
    /// Pitch shifts in semitones; duration is kept.
    pub pitch_semitones: Vec<f32>,
    /// Standard deviation of additive Gaussian noise; `0` disables it.
    pub noise_std: f32,
    pub seed: u64,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            stretch_rates: vec![0.9, 1.1],
            pitch_semitones: vec![2.0, -2.0],
            noise_std: 0.005,
            seed: 42,
        }
    }
}

impl AugmentOptions {
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Clips returned per input, the original included.
    pub fn variants_per_clip(&self) -> usize {
        1 + self.stretch_rates.len() + self.pitch_semitones.len() + usize::from(self.noise_std > 0.0)
    }
}

/// Original clip followed by time-stretched, pitch-shifted and noisy variants.
///
/// Every variant is brought back to the canonical window through
/// [`audio::normalize`].
pub fn augment_clip(
    clip: &NormalizedAudio,
    rng: &mut StdRng,
    options: &AugmentOptions,
) -> Result<Vec<NormalizedAudio>, DatasetError> {
    let samples = clip.samples();
    let mut out = Vec::with_capacity(options.variants_per_clip());
    out.push(clip.clone());
    for &rate in &options.stretch_rates {
        out.push(audio::normalize(&time_stretch(samples, rate)?, TARGET_SAMPLE_RATE)?);
    }
    for &steps in &options.pitch_semitones {
        out.push(audio::normalize(&pitch_shift(samples, steps)?, TARGET_SAMPLE_RATE)?);
    }
    if options.noise_std > 0.0 {
        let noisy: Vec<f32> = samples
            .iter()
            .map(|&v| v + gaussian(rng) * options.noise_std)
            .collect();
        out.push(audio::normalize(&noisy, TARGET_SAMPLE_RATE)?);
    }
    Ok(out)
}

/// Shift pitch by `semitones` at constant duration.
///
/// Stretches by the inverse pitch ratio, then resamples back so the length
/// returns to the input's and every frequency scales by `2^(semitones / 12)`.
fn pitch_shift(samples: &[f32], semitones: f32) -> Result<Vec<f32>, DatasetError> {
    let rate = 2.0_f64.powf(-f64::from(semitones) / 12.0);
    let stretched = time_stretch(samples, rate as f32)?;
    let source_rate = (f64::from(TARGET_SAMPLE_RATE) / rate).round() as u32;
    let mut shifted = audio::resample(&stretched, source_rate, TARGET_SAMPLE_RATE)?;
    shifted.resize(samples.len(), 0.0);
    Ok(shifted)
}

/// Standard normal draw (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}
