use ndarray::Array2;

const SLANEY_F_SP: f64 = 200.0 / 3.0;
const SLANEY_MIN_LOG_HZ: f64 = 1_000.0;
const SLANEY_MIN_LOG_MEL: f64 = SLANEY_MIN_LOG_HZ / SLANEY_F_SP;

fn slaney_logstep() -> f64 {
    6.4_f64.ln() / 27.0
}

/// Hz to mel on the Slaney (Auditory Toolbox) scale: linear below 1 kHz, log above.
pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    if hz >= SLANEY_MIN_LOG_HZ {
        SLANEY_MIN_LOG_MEL + (hz / SLANEY_MIN_LOG_HZ).ln() / slaney_logstep()
    } else {
        hz / SLANEY_F_SP
    }
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    if mel >= SLANEY_MIN_LOG_MEL {
        SLANEY_MIN_LOG_HZ * (slaney_logstep() * (mel - SLANEY_MIN_LOG_MEL)).exp()
    } else {
        mel * SLANEY_F_SP
    }
}

/// Triangular, area-normalized mel filters stored sparsely per band.
pub(crate) struct MelBank {
    bins: usize,
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(crate) fn new(sample_rate: u32, n_fft: usize, mel_bands: usize, f_min: f32, f_max: f32) -> Self {
        let bins = n_fft / 2 + 1;
        let sr = sample_rate.max(1) as f64;
        let fft_freqs: Vec<f64> = (0..bins).map(|k| k as f64 * sr / n_fft as f64).collect();
        let mel_f = mel_frequencies(mel_bands + 2, f_min as f64, f_max as f64);
        let filters = (0..mel_bands)
            .map(|band| build_filter(&fft_freqs, &mel_f, band))
            .collect();
        Self { bins, filters }
    }

    #[cfg(test)]
    fn bands(&self) -> usize {
        self.filters.len()
    }

    /// Mel power from a `(bins, frames)` power spectrogram; returns `(bands, frames)`.
    pub(crate) fn apply(&self, power: &Array2<f32>) -> Array2<f32> {
        let frames = power.ncols();
        let mut out = Array2::<f32>::zeros((self.filters.len(), frames));
        for (band, filter) in self.filters.iter().enumerate() {
            for frame in 0..frames {
                let mut sum = 0.0_f64;
                for &(bin, weight) in filter {
                    if bin < self.bins && bin < power.nrows() {
                        sum += power[[bin, frame]].max(0.0) as f64 * weight as f64;
                    }
                }
                out[[band, frame]] = sum as f32;
            }
        }
        out
    }

    #[cfg(test)]
    fn weights(&self, band: usize) -> &[(usize, f32)] {
        &self.filters[band]
    }
}

/// `count` points evenly spaced on the mel axis, returned in Hz.
fn mel_frequencies(count: usize, f_min: f64, f_max: f64) -> Vec<f64> {
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max.max(f_min));
    let steps = count.saturating_sub(1).max(1) as f64;
    (0..count)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / steps))
        .collect()
}

fn build_filter(fft_freqs: &[f64], mel_f: &[f64], band: usize) -> Vec<(usize, f32)> {
    let left = mel_f[band];
    let center = mel_f[band + 1];
    let right = mel_f[band + 2];
    let lower_width = center - left;
    let upper_width = right - center;
    if lower_width <= 0.0 || upper_width <= 0.0 {
        return Vec::new();
    }
    let enorm = 2.0 / (right - left);
    fft_freqs
        .iter()
        .enumerate()
        .filter_map(|(bin, &freq)| {
            let lower = (freq - left) / lower_width;
            let upper = (right - freq) / upper_width;
            let weight = lower.min(upper).max(0.0) * enorm;
            (weight > 0.0).then_some((bin, weight as f32))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slaney_scale_is_linear_below_one_khz() {
        assert!((hz_to_mel(200.0) - 3.0).abs() < 1e-12);
        assert!((hz_to_mel(1_000.0) - 15.0).abs() < 1e-12);
        for hz in [20.0, 440.0, 1_000.0, 3_000.0, 8_000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn filters_cover_requested_range() {
        let bank = MelBank::new(16_000, 2048, 128, 20.0, 8_000.0);
        assert_eq!(bank.bands(), 128);
        let first = bank.weights(0);
        let last = bank.weights(127);
        assert!(!first.is_empty());
        assert!(!last.is_empty());
        // 20 Hz sits just above bin 2 at 7.8125 Hz per bin.
        assert!(first.iter().all(|&(bin, _)| bin >= 3));
        assert!(last.iter().all(|&(bin, _)| bin <= 1024));
    }

    #[test]
    fn filter_peaks_follow_area_normalization() {
        let bank = MelBank::new(16_000, 2048, 128, 20.0, 8_000.0);
        let mel_f = mel_frequencies(130, 20.0, 8_000.0);
        for band in [10, 64, 120] {
            let peak = bank
                .weights(band)
                .iter()
                .fold(0.0_f32, |m, &(_, w)| m.max(w));
            let bound = 2.0 / (mel_f[band + 2] - mel_f[band]);
            assert!(peak as f64 <= bound + 1e-9);
            assert!(peak as f64 > bound * 0.3);
        }
    }

    #[test]
    fn apply_sums_weighted_power() {
        let bank = MelBank::new(16_000, 64, 4, 0.0, 8_000.0);
        let power = Array2::<f32>::ones((33, 3));
        let mel = bank.apply(&power);
        assert_eq!(mel.dim(), (4, 3));
        for band in 0..4 {
            let expected: f32 = bank.weights(band).iter().map(|&(_, w)| w).sum();
            assert!((mel[[band, 1]] - expected).abs() < 1e-5);
        }
    }
}
