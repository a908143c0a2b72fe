use ndarray::Array2;
use serde::{Deserialize, Serialize};

const ROLLOFF_FRACTION: f64 = 0.85;
/// Magnitudes at or below this are treated as zero when counting crossings.
const ZCR_THRESHOLD: f32 = 1e-10;
/// Pitch classes in chroma output, starting at C.
pub const CHROMA_BINS: usize = 12;
const CHROMA_MIN_HZ: f64 = 20.0;
const A4_HZ: f64 = 440.0;

/// Mean and standard deviation for an aggregated metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Stats {
    pub mean: f32,
    pub std: f32,
}

impl Stats {
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        Self {
            mean: mean as f32,
            std: var.max(0.0).sqrt() as f32,
        }
    }
}

/// Per-frame spectral shape descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectralFeatures {
    pub centroid_hz: Vec<f32>,
    pub rolloff_hz: Vec<f32>,
    pub bandwidth_hz: Vec<f32>,
    pub zero_crossing_rate: Vec<f32>,
}

/// Clip-level summary of [`SpectralFeatures`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectralSummary {
    pub centroid_hz: Stats,
    pub rolloff_hz: Stats,
    pub bandwidth_hz: Stats,
    pub zero_crossing_rate: Stats,
}

impl SpectralFeatures {
    pub fn summary(&self) -> SpectralSummary {
        SpectralSummary {
            centroid_hz: Stats::of(&self.centroid_hz),
            rolloff_hz: Stats::of(&self.rolloff_hz),
            bandwidth_hz: Stats::of(&self.bandwidth_hz),
            zero_crossing_rate: Stats::of(&self.zero_crossing_rate),
        }
    }
}

pub(crate) fn bin_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    let sr = sample_rate.max(1) as f64;
    (0..n_fft / 2 + 1)
        .map(|bin| bin as f64 * sr / n_fft as f64)
        .collect()
}

/// Centroid, roll-off and bandwidth for each column of a `(bins, frames)` magnitude spectrogram.
pub(crate) fn shape_descriptors(
    magnitude: &Array2<f32>,
    freqs: &[f64],
) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let frames = magnitude.ncols();
    let mut centroids = Vec::with_capacity(frames);
    let mut rolloffs = Vec::with_capacity(frames);
    let mut bandwidths = Vec::with_capacity(frames);
    for column in magnitude.columns() {
        let total: f64 = column.iter().map(|&m| m.max(0.0) as f64).sum();
        if total <= 0.0 {
            centroids.push(0.0);
            rolloffs.push(0.0);
            bandwidths.push(0.0);
            continue;
        }
        let centroid: f64 = column
            .iter()
            .zip(freqs)
            .map(|(&m, &f)| m.max(0.0) as f64 * f)
            .sum::<f64>()
            / total;
        let spread: f64 = column
            .iter()
            .zip(freqs)
            .map(|(&m, &f)| m.max(0.0) as f64 / total * (f - centroid).powi(2))
            .sum();
        let target = total * ROLLOFF_FRACTION;
        let mut cumulative = 0.0_f64;
        let mut rolloff = freqs.last().copied().unwrap_or(0.0);
        for (&m, &f) in column.iter().zip(freqs) {
            cumulative += m.max(0.0) as f64;
            if cumulative >= target {
                rolloff = f;
                break;
            }
        }
        centroids.push(centroid as f32);
        rolloffs.push(rolloff as f32);
        bandwidths.push(spread.max(0.0).sqrt() as f32);
    }
    (centroids, rolloffs, bandwidths)
}

/// Fraction of sign changes per frame, frames centered with edge padding.
pub fn zero_crossing_rate(samples: &[f32], frame_length: usize, hop: usize) -> Vec<f32> {
    let frame_length = frame_length.max(1);
    let hop = hop.max(1);
    let frames = 1 + samples.len() / hop;
    if samples.is_empty() {
        return vec![0.0; frames];
    }
    let half = frame_length / 2;
    let last = samples.len() - 1;
    let sample_at = |padded: usize| -> f32 {
        let idx = padded.saturating_sub(half).min(last);
        let value = samples[idx];
        if value.abs() <= ZCR_THRESHOLD { 0.0 } else { value }
    };
    (0..frames)
        .map(|frame| {
            let start = frame * hop;
            let mut crossings = 0usize;
            let mut prev = sample_at(start).is_sign_negative();
            for i in 1..frame_length {
                let current = sample_at(start + i).is_sign_negative();
                if current != prev {
                    crossings += 1;
                }
                prev = current;
            }
            crossings as f32 / frame_length as f32
        })
        .collect()
}

/// Nearest equal-tempered pitch class (0 = C) of each bin, `None` below 20 Hz.
pub(crate) fn chroma_classes(freqs: &[f64]) -> Vec<Option<usize>> {
    freqs
        .iter()
        .map(|&f| {
            if f < CHROMA_MIN_HZ {
                return None;
            }
            let midi = 69.0 + 12.0 * (f / A4_HZ).log2();
            Some((midi.round() as i64).rem_euclid(CHROMA_BINS as i64) as usize)
        })
        .collect()
}

/// Fold a `(bins, frames)` power spectrogram onto 12 pitch classes, max-normalized per frame.
pub(crate) fn chroma_from_power(power: &Array2<f32>, classes: &[Option<usize>]) -> Array2<f32> {
    let frames = power.ncols();
    let mut chroma = Array2::<f32>::zeros((CHROMA_BINS, frames));
    for (bin, class) in classes.iter().enumerate().take(power.nrows()) {
        let Some(class) = *class else {
            continue;
        };
        for frame in 0..frames {
            chroma[[class, frame]] += power[[bin, frame]].max(0.0);
        }
    }
    for mut column in chroma.columns_mut() {
        let peak = column.iter().fold(0.0_f32, |m, &v| m.max(v));
        if peak > 0.0 {
            column.mapv_inplace(|v| v / peak);
        }
    }
    chroma
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_use_population_std() {
        let stats = Stats::of(&[1.0, 3.0]);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.std, 1.0);
        assert_eq!(Stats::of(&[]), Stats { mean: 0.0, std: 0.0 });
    }

    #[test]
    fn single_bin_spectrum_has_zero_bandwidth() {
        let freqs = bin_frequencies(16_000, 8);
        let mut mag = Array2::<f32>::zeros((5, 2));
        mag[[2, 0]] = 3.0;
        let (centroid, rolloff, bandwidth) = shape_descriptors(&mag, &freqs);
        assert_eq!(centroid[0], 4_000.0);
        assert_eq!(rolloff[0], 4_000.0);
        assert_eq!(bandwidth[0], 0.0);
        assert_eq!((centroid[1], rolloff[1], bandwidth[1]), (0.0, 0.0, 0.0));
    }

    #[test]
    fn two_equal_bins_spread_symmetrically() {
        let freqs = bin_frequencies(16_000, 8);
        let mut mag = Array2::<f32>::zeros((5, 1));
        mag[[1, 0]] = 1.0;
        mag[[3, 0]] = 1.0;
        let (centroid, rolloff, bandwidth) = shape_descriptors(&mag, &freqs);
        assert_eq!(centroid[0], 4_000.0);
        assert_eq!(rolloff[0], 6_000.0);
        assert_eq!(bandwidth[0], 2_000.0);
    }

    #[test]
    fn alternating_signal_crosses_every_sample() {
        let samples: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let zcr = zero_crossing_rate(&samples, 16, 8);
        assert_eq!(zcr.len(), 9);
        assert!((zcr[4] - 15.0 / 16.0).abs() < 1e-6);
        assert!(zero_crossing_rate(&vec![0.0; 64], 16, 8).iter().all(|&z| z == 0.0));
    }

    #[test]
    fn a440_folds_to_pitch_class_a() {
        let classes = chroma_classes(&[10.0, 261.63, 440.0, 880.0]);
        assert_eq!(classes, vec![None, Some(0), Some(9), Some(9)]);
    }

    #[test]
    fn chroma_frames_are_max_normalized() {
        let classes = vec![None, Some(0), Some(9), Some(9)];
        let mut power = Array2::<f32>::zeros((4, 2));
        power[[1, 0]] = 1.0;
        power[[2, 0]] = 2.0;
        power[[3, 0]] = 2.0;
        let chroma = chroma_from_power(&power, &classes);
        assert_eq!(chroma[[9, 0]], 1.0);
        assert_eq!(chroma[[0, 0]], 0.25);
        assert!(chroma.column(1).iter().all(|&v| v == 0.0));
    }
}
