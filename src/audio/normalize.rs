use tracing::debug;

use super::resample::resample;
use super::{AudioError, NormalizedAudio, TARGET_LEN, TARGET_SAMPLE_RATE};

/// Bring arbitrary audio to the canonical analysis window.
///
/// Resamples to 16 kHz, keeps the first [`TARGET_LEN`] samples (trailing audio
/// is dropped, not centered), right-pads short clips with zeros and divides by
/// the peak magnitude unless the clip is silent. Non-finite samples are zeroed.
pub fn normalize(samples: &[f32], sample_rate: u32) -> Result<NormalizedAudio, AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(sample_rate));
    }
    let sanitized: Vec<f32> = samples.iter().copied().map(sanitize_sample).collect();
    let mut window = if sample_rate != TARGET_SAMPLE_RATE {
        resample(&sanitized, sample_rate, TARGET_SAMPLE_RATE)?
    } else {
        sanitized
    };
    let source_len = window.len();
    fit_to_length(&mut window, TARGET_LEN);
    let peak = normalize_peak_in_place(&mut window);
    debug!(
        source_rate = sample_rate,
        source_len, peak, "normalized audio to canonical window"
    );
    Ok(NormalizedAudio::from_canonical(window))
}

fn fit_to_length(samples: &mut Vec<f32>, target_len: usize) {
    if samples.len() > target_len {
        samples.truncate(target_len);
    } else {
        samples.resize(target_len, 0.0);
    }
}

/// Divide by the peak magnitude; returns the peak that was removed.
fn normalize_peak_in_place(samples: &mut [f32]) -> f32 {
    let peak = max_abs(samples);
    if !peak.is_finite() || peak <= 0.0 {
        return peak;
    }
    for sample in samples.iter_mut() {
        *sample /= peak;
    }
    peak
}

pub(crate) fn max_abs(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()))
}

pub(crate) fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() { sample } else { 0.0 }
}
