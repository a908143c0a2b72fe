//! Breathing cadence from a slow-envelope band-pass and peak picking.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Breathing band edges in Hz.
pub const BREATH_BAND_HZ: (f64, f64) = (0.1, 1.0);
/// Minimum spacing between detected breaths.
pub const MIN_BREATH_INTERVAL_SECONDS: f64 = 0.5;
/// Minimum peak prominence on the rectified filtered signal.
pub const MIN_PEAK_PROMINENCE: f64 = 0.1;
const FILTER_ORDER: usize = 4;

/// Breathing rhythm summary of one clip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BreathingCadence {
    pub breaths_per_minute: f32,
    /// Coefficient of variation of the inter-breath intervals; 0 with fewer than two breaths.
    pub regularity: f32,
    pub cycle_count: usize,
}

/// Estimate breathing rate and regularity of `samples`.
pub fn breathing_cadence(samples: &[f32], sample_rate: u32) -> BreathingCadence {
    if samples.is_empty() || sample_rate == 0 {
        return BreathingCadence {
            breaths_per_minute: 0.0,
            regularity: 0.0,
            cycle_count: 0,
        };
    }
    let fs = sample_rate as f64;
    let sections = butterworth_bandpass(FILTER_ORDER, BREATH_BAND_HZ.0, BREATH_BAND_HZ.1, fs);
    let rectified: Vec<f64> = sos_filter(&sections, samples)
        .into_iter()
        .map(f64::abs)
        .collect();
    let distance = (fs * MIN_BREATH_INTERVAL_SECONDS).ceil().max(1.0) as usize;
    let peaks = find_peaks(&rectified, distance, MIN_PEAK_PROMINENCE);

    let duration = samples.len() as f64 / fs;
    let breaths_per_minute = peaks.len() as f64 / duration * 60.0;
    BreathingCadence {
        breaths_per_minute: breaths_per_minute as f32,
        regularity: interval_variation(&peaks, fs) as f32,
        cycle_count: peaks.len(),
    }
}

fn interval_variation(peaks: &[usize], fs: f64) -> f64 {
    if peaks.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f64> = peaks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 / fs)
        .collect();
    let n = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() / mean
}

/// One biquad: `b0 + b1 z^-1 + b2 z^-2` over `1 + a1 z^-1 + a2 z^-2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Biquad {
    pub(crate) b: [f64; 3],
    pub(crate) a: [f64; 3],
}

/// Digital Butterworth band-pass as `order` second-order sections.
///
/// Analog prototype, low-pass to band-pass transform around pre-warped edges,
/// then the bilinear transform. Each section pairs one conjugate pole pair with
/// zeros at z = 1 and z = -1; the overall gain sits on the first section.
pub(crate) fn butterworth_bandpass(order: usize, low_hz: f64, high_hz: f64, fs: f64) -> Vec<Biquad> {
    // Normalized design at fs = 2 so the bilinear constant is 4.
    let nyquist = fs / 2.0;
    let warp = |hz: f64| 4.0 * (PI * (hz / nyquist) / 2.0).tan();
    let (w_low, w_high) = (warp(low_hz), warp(high_hz));
    let bandwidth = w_high - w_low;
    let w0_sq = w_low * w_high;

    let mut analog_poles = Vec::with_capacity(order * 2);
    for k in 0..order {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        let prototype = Complex64::from_polar(1.0, theta);
        let scaled = prototype * (bandwidth / 2.0);
        let root = (scaled * scaled - w0_sq).sqrt();
        analog_poles.push(scaled + root);
        analog_poles.push(scaled - root);
    }

    let four = Complex64::new(4.0, 0.0);
    let mut gain = Complex64::new((4.0 * bandwidth).powi(order as i32), 0.0);
    for pole in &analog_poles {
        gain /= four - pole;
    }

    let mut sections: Vec<Biquad> = analog_poles
        .iter()
        .filter(|pole| pole.im >= 0.0)
        .take(order)
        .map(|&pole| {
            let z = (four + pole) / (four - pole);
            Biquad {
                b: [1.0, 0.0, -1.0],
                a: [1.0, -2.0 * z.re, z.norm_sqr()],
            }
        })
        .collect();
    if let Some(first) = sections.first_mut() {
        for coeff in first.b.iter_mut() {
            *coeff *= gain.re;
        }
    }
    sections
}

/// Causal cascade of biquads in transposed direct form II.
pub(crate) fn sos_filter(sections: &[Biquad], input: &[f32]) -> Vec<f64> {
    let mut signal: Vec<f64> = input.iter().map(|&v| v as f64).collect();
    for section in sections {
        let [b0, b1, b2] = section.b;
        let [_, a1, a2] = section.a;
        let (mut z1, mut z2) = (0.0_f64, 0.0_f64);
        for value in signal.iter_mut() {
            let x = *value;
            let y = b0 * x + z1;
            z1 = b1 * x - a1 * y + z2;
            z2 = b2 * x - a2 * y;
            *value = y;
        }
    }
    signal
}

/// Local maxima at least `distance` samples apart (taller peaks win) whose
/// prominence reaches `min_prominence`. Plateaus report their middle sample.
pub(crate) fn find_peaks(values: &[f64], distance: usize, min_prominence: f64) -> Vec<usize> {
    let candidates = local_maxima(values);
    let spaced = select_by_distance(values, &candidates, distance.max(1));
    spaced
        .into_iter()
        .filter(|&peak| prominence(values, peak) >= min_prominence)
        .collect()
}

fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }
    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(values: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        values[peaks[a]]
            .total_cmp(&values[peaks[b]])
            .then_with(|| a.cmp(&b))
    });
    for &current in order.iter().rev() {
        if !keep[current] {
            continue;
        }
        let mut k = current;
        while k > 0 && peaks[current] - peaks[k - 1] < distance {
            k -= 1;
            keep[k] = false;
        }
        let mut k = current + 1;
        while k < peaks.len() && peaks[k] - peaks[current] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&peak, kept)| kept.then_some(peak))
        .collect()
}

fn prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];
    let mut left_min = height;
    for &v in values[..peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }
    let mut right_min = height;
    for &v in &values[peak + 1..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }
    height - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnitude_at(sections: &[Biquad], freq: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * freq / fs;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        sections
            .iter()
            .map(|s| {
                let num = s.b[0] + z1 * s.b[1] + z2 * s.b[2];
                let den = s.a[0] + z1 * s.a[1] + z2 * s.a[2];
                (num / den).norm()
            })
            .product()
    }

    #[test]
    fn bandpass_passes_center_and_rejects_out_of_band() {
        let fs = 100.0;
        let sections = butterworth_bandpass(4, 2.0, 8.0, fs);
        assert_eq!(sections.len(), 4);
        let center = magnitude_at(&sections, 4.0, fs);
        assert!((center - 1.0).abs() < 0.05, "center gain {center}");
        let edge = magnitude_at(&sections, 2.0, fs);
        assert!((edge - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02, "edge gain {edge}");
        assert!(magnitude_at(&sections, 30.0, fs) < 0.01);
        assert!(magnitude_at(&sections, 0.2, fs) < 0.01);
    }

    #[test]
    fn breathing_band_is_stable_at_16k() {
        let sections = butterworth_bandpass(4, 0.1, 1.0, 16_000.0);
        for section in &sections {
            assert!(section.a[2] < 1.0, "pole radius must stay inside the unit circle");
        }
        let center = magnitude_at(&sections, (0.1_f64 * 1.0).sqrt(), 16_000.0);
        assert!((center - 1.0).abs() < 0.05, "center gain {center}");
    }

    #[test]
    fn plateau_reports_middle_sample() {
        let values = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(local_maxima(&values), vec![3]);
    }

    #[test]
    fn distance_keeps_taller_peak() {
        let values = [0.0, 1.0, 0.0, 3.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.5, 0.0];
        assert_eq!(find_peaks(&values, 3, 0.0), vec![3, 9]);
    }

    #[test]
    fn prominence_filters_ripples() {
        let values = [0.0, 1.0, 0.95, 1.02, 0.0];
        assert_eq!(find_peaks(&values, 1, 0.1), vec![3]);
        assert!((prominence(&values, 1) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn silence_has_no_breaths() {
        let cadence = breathing_cadence(&vec![0.0; 48_000], 16_000);
        assert_eq!(cadence.cycle_count, 0);
        assert_eq!(cadence.breaths_per_minute, 0.0);
        assert_eq!(cadence.regularity, 0.0);
    }

    fn slow_sine(freq: f64, seconds: f64) -> Vec<f32> {
        let fs = 16_000.0;
        (0..(fs * seconds) as usize)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin() as f32)
            .collect()
    }

    #[test]
    fn half_hertz_breathing_counts_sixty_per_minute() {
        let cadence = breathing_cadence(&slow_sine(0.5, 3.0), 16_000);
        assert_eq!(cadence.cycle_count, 3);
        assert!((cadence.breaths_per_minute - 60.0).abs() < 1e-3);
        assert!(cadence.regularity < 0.15, "regularity {}", cadence.regularity);
    }

    #[test]
    fn slower_breathing_over_longer_clip() {
        let cadence = breathing_cadence(&slow_sine(0.25, 10.0), 16_000);
        assert_eq!(cadence.cycle_count, 5);
        assert!((cadence.breaths_per_minute - 30.0).abs() < 1e-3);
        assert!(cadence.regularity < 0.15, "regularity {}", cadence.regularity);
    }

    #[test]
    fn evenly_spaced_peaks_are_perfectly_regular() {
        let peaks = [0, 8_000, 16_000, 24_000];
        assert_eq!(interval_variation(&peaks, 16_000.0), 0.0);
        assert_eq!(interval_variation(&peaks[..1], 16_000.0), 0.0);
        let uneven = [0, 8_000, 24_000];
        assert!((interval_variation(&uneven, 16_000.0) - 1.0 / 3.0).abs() < 1e-12);
    }
}
