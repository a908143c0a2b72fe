use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

pub(crate) use rustfft::num_complex::Complex32;

/// Periodic Hann window (`0.5 - 0.5 cos(2πn/N)`), the STFT analysis window.
pub(crate) fn periodic_hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = length as f32;
    (0..length)
        .map(|n| 0.5_f32 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
        .collect()
}

/// FFT of a fixed length and direction, shareable across threads.
pub(crate) struct FftPlan {
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    scratch_len: usize,
}

impl FftPlan {
    pub(crate) fn new(len: usize) -> Result<Self, String> {
        Self::planned(len, false)
    }

    /// Unnormalized inverse transform; divide by `len` to undo [`FftPlan::new`].
    pub(crate) fn new_inverse(len: usize) -> Result<Self, String> {
        Self::planned(len, true)
    }

    fn planned(len: usize, inverse: bool) -> Result<Self, String> {
        if len == 0 {
            return Err("FFT length must be non-zero".to_string());
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = if inverse {
            planner.plan_fft_inverse(len)
        } else {
            planner.plan_fft_forward(len)
        };
        let scratch_len = fft.get_inplace_scratch_len();
        Ok(Self {
            len,
            fft,
            scratch_len,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Scratch buffer sized for [`FftPlan::process`].
    pub(crate) fn make_scratch(&self) -> Vec<Complex32> {
        vec![Complex32::default(); self.scratch_len]
    }

    pub(crate) fn process(
        &self,
        buffer: &mut [Complex32],
        scratch: &mut [Complex32],
    ) -> Result<(), String> {
        if buffer.len() != self.len {
            return Err(format!(
                "FFT length mismatch: buffer {} plan {}",
                buffer.len(),
                self.len
            ));
        }
        if scratch.len() < self.scratch_len {
            return Err(format!(
                "FFT scratch too small: need {}, got {}",
                self.scratch_len,
                scratch.len()
            ));
        }
        self.fft
            .process_with_scratch(buffer, &mut scratch[..self.scratch_len]);
        Ok(())
    }
}

/// `|X|^2` for bins `0..=N/2`.
pub(crate) fn power_spectrum_into(fft: &[Complex32], out: &mut [f32]) {
    for (slot, c) in out.iter_mut().zip(fft.iter()) {
        *slot = c.norm_sqr().max(0.0);
    }
}
