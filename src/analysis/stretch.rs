//! Pitch-preserving time stretch (phase vocoder).

use std::f64::consts::TAU;

use ndarray::Array2;

use super::FeatureError;
use super::fft::{Complex32, FftPlan, periodic_hann_window};
use super::stft::{centered_istft, centered_stft};

/// Analysis frame of the vocoder.
pub const STRETCH_N_FFT: usize = 2048;
/// Vocoder hop, a quarter frame.
pub const STRETCH_HOP: usize = STRETCH_N_FFT / 4;

/// Change duration by `1 / rate` while keeping pitch.
///
/// `rate > 1` speeds the clip up. The output has `round(len / rate)` samples.
pub fn time_stretch(samples: &[f32], rate: f32) -> Result<Vec<f32>, FeatureError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(FeatureError::InvalidInput(format!(
            "stretch rate must be > 0, got {rate}"
        )));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    let forward = FftPlan::new(STRETCH_N_FFT).map_err(FeatureError::Fft)?;
    let inverse = FftPlan::new_inverse(STRETCH_N_FFT).map_err(FeatureError::Fft)?;
    let window = periodic_hann_window(STRETCH_N_FFT);
    let stft = centered_stft(samples, &forward, &window, STRETCH_HOP)?;
    let stretched = phase_vocoder(&stft, rate as f64, STRETCH_HOP);
    let length = ((samples.len() as f64) / rate as f64).round().max(1.0) as usize;
    centered_istft(&stretched, &inverse, &window, STRETCH_HOP, length)
}

/// Resample an STFT along time by `rate`, keeping each bin's phase advance.
fn phase_vocoder(stft: &Array2<Complex32>, rate: f64, hop: usize) -> Array2<Complex32> {
    let (bins, frames) = stft.dim();
    let steps: Vec<f64> = (0..)
        .map(|i| i as f64 * rate)
        .take_while(|&step| step < frames as f64)
        .collect();
    let mut out = Array2::<Complex32>::zeros((bins, steps.len()));
    if bins == 0 || frames == 0 {
        return out;
    }
    let n_fft = 2 * (bins - 1).max(1);
    let expected_advance: Vec<f64> = (0..bins)
        .map(|bin| TAU * hop as f64 * bin as f64 / n_fft as f64)
        .collect();
    let mut phase: Vec<f64> = stft.column(0).iter().map(|c| c.arg() as f64).collect();
    let column = |frame: usize, bin: usize| {
        if frame < frames {
            stft[[bin, frame]]
        } else {
            Complex32::default()
        }
    };

    for (t, &step) in steps.iter().enumerate() {
        let left = step.floor() as usize;
        let alpha = (step - left as f64) as f32;
        for bin in 0..bins {
            let a = column(left, bin);
            let b = column(left + 1, bin);
            let magnitude = (1.0 - alpha) * a.norm() + alpha * b.norm();
            out[[bin, t]] = Complex32::from_polar(magnitude, phase[bin] as f32);

            let mut deviation = b.arg() as f64 - a.arg() as f64 - expected_advance[bin];
            deviation -= TAU * (deviation / TAU).round();
            phase[bin] = (phase[bin] + expected_advance[bin] + deviation).rem_euclid(TAU);
        }
    }
    out
}
