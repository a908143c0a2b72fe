use ndarray::Array2;

use super::FeatureError;
use super::fft::{Complex32, FftPlan, power_spectrum_into};

/// Frames produced by a centered STFT: `1 + len / hop`.
pub fn centered_frame_count(sample_count: usize, hop: usize) -> usize {
    1 + sample_count / hop.max(1)
}

/// Centered power spectrogram, shaped `(n_fft / 2 + 1, frames)`.
///
/// Frame `t` is centered on sample `t * hop`; the signal is zero-padded by
/// `n_fft / 2` on both sides.
pub(crate) fn centered_power_spectrogram(
    samples: &[f32],
    plan: &FftPlan,
    window: &[f32],
    hop: usize,
) -> Result<Array2<f32>, FeatureError> {
    let n_fft = plan.len();
    if window.len() != n_fft {
        return Err(FeatureError::InvalidInput(format!(
            "window length {} does not match FFT length {n_fft}",
            window.len()
        )));
    }
    let hop = hop.max(1);
    let bins = n_fft / 2 + 1;
    let frames = centered_frame_count(samples.len(), hop);
    let mut spectrogram = Array2::<f32>::zeros((bins, frames));
    let mut buf = vec![Complex32::default(); n_fft];
    let mut scratch = plan.make_scratch();
    let mut power = vec![0.0_f32; bins];
    for frame in 0..frames {
        fill_centered(&mut buf, samples, frame * hop, window);
        plan.process(&mut buf, &mut scratch)
            .map_err(FeatureError::Fft)?;
        power_spectrum_into(&buf, &mut power);
        for (bin, &p) in power.iter().enumerate() {
            spectrogram[[bin, frame]] = p;
        }
    }
    Ok(spectrogram)
}

/// Complex centered STFT, shaped `(n_fft / 2 + 1, frames)`, same framing as
/// [`centered_power_spectrogram`].
pub(crate) fn centered_stft(
    samples: &[f32],
    plan: &FftPlan,
    window: &[f32],
    hop: usize,
) -> Result<Array2<Complex32>, FeatureError> {
    let n_fft = plan.len();
    if window.len() != n_fft {
        return Err(FeatureError::InvalidInput(format!(
            "window length {} does not match FFT length {n_fft}",
            window.len()
        )));
    }
    let hop = hop.max(1);
    let bins = n_fft / 2 + 1;
    let frames = centered_frame_count(samples.len(), hop);
    let mut stft = Array2::<Complex32>::zeros((bins, frames));
    let mut buf = vec![Complex32::default(); n_fft];
    let mut scratch = plan.make_scratch();
    for frame in 0..frames {
        fill_centered(&mut buf, samples, frame * hop, window);
        plan.process(&mut buf, &mut scratch)
            .map_err(FeatureError::Fft)?;
        for (bin, &value) in buf[..bins].iter().enumerate() {
            stft[[bin, frame]] = value;
        }
    }
    Ok(stft)
}

/// Weighted overlap-add inverse of [`centered_stft`], trimmed to `length` samples.
///
/// `inverse` must be an inverse plan of the forward FFT length. Samples the
/// window never covers come back as zero.
pub(crate) fn centered_istft(
    stft: &Array2<Complex32>,
    inverse: &FftPlan,
    window: &[f32],
    hop: usize,
    length: usize,
) -> Result<Vec<f32>, FeatureError> {
    let n_fft = inverse.len();
    let bins = n_fft / 2 + 1;
    if window.len() != n_fft || stft.nrows() != bins {
        return Err(FeatureError::InvalidInput(format!(
            "STFT with {} bins and window {} does not match FFT length {n_fft}",
            stft.nrows(),
            window.len()
        )));
    }
    let hop = hop.max(1);
    let frames = stft.ncols();
    let span = n_fft + hop * frames.saturating_sub(1);
    let mut signal = vec![0.0_f32; span];
    let mut weight = vec![0.0_f32; span];
    let mut buf = vec![Complex32::default(); n_fft];
    let mut scratch = inverse.make_scratch();
    let scale = 1.0 / n_fft as f32;
    for frame in 0..frames {
        for (bin, cell) in buf.iter_mut().enumerate() {
            *cell = if bin < bins {
                stft[[bin, frame]]
            } else {
                stft[[n_fft - bin, frame]].conj()
            };
        }
        buf[0].im = 0.0;
        if n_fft % 2 == 0 {
            buf[n_fft / 2].im = 0.0;
        }
        inverse
            .process(&mut buf, &mut scratch)
            .map_err(FeatureError::Fft)?;
        let offset = frame * hop;
        for (i, (&value, &win)) in buf.iter().zip(window).enumerate() {
            signal[offset + i] += value.re * scale * win;
            weight[offset + i] += win * win;
        }
    }
    for (sample, &w) in signal.iter_mut().zip(&weight) {
        if w > f32::MIN_POSITIVE {
            *sample /= w;
        }
    }
    let mut out: Vec<f32> = signal.into_iter().skip(n_fft / 2).take(length).collect();
    out.resize(length, 0.0);
    Ok(out)
}

fn fill_centered(target: &mut [Complex32], samples: &[f32], center: usize, window: &[f32]) {
    let half = target.len() / 2;
    for (i, (cell, &win)) in target.iter_mut().zip(window).enumerate() {
        let src = (center + i)
            .checked_sub(half)
            .and_then(|idx| samples.get(idx))
            .copied()
            .unwrap_or(0.0);
        *cell = Complex32::new(src * win, 0.0);
    }
}
