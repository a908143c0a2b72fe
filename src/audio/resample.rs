use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

use super::AudioError;

/// Input chunk size for the synchronous FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Band-limited resampling of a mono clip.
///
/// The output length is `round(len * to / from)`, so clips of identical
/// duration always produce identical lengths regardless of resampler latency.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AudioError> {
    if from == 0 {
        return Err(AudioError::InvalidSampleRate(from));
    }
    if to == 0 {
        return Err(AudioError::InvalidSampleRate(to));
    }
    if samples.is_empty() || from == to {
        return Ok(samples.to_vec());
    }
    let resample_err = |message: String| AudioError::Resample { from, to, message };

    let mut resampler = Fft::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLE_CHUNK,
        1,
        1,
        FixedSync::Input,
    )
    .map_err(|err| resample_err(err.to_string()))?;

    let input_len = samples.len();
    let out_capacity = resampler.process_all_needed_output_len(input_len);
    let mut out = vec![0.0_f32; out_capacity];
    let input =
        InterleavedSlice::new(samples, 1, input_len).map_err(|err| resample_err(err.to_string()))?;
    let mut output = InterleavedSlice::new_mut(&mut out, 1, out_capacity)
        .map_err(|err| resample_err(err.to_string()))?;
    let (_frames_read, frames_written) = resampler
        .process_all_into_buffer(&input, &mut output, input_len, None)
        .map_err(|err| resample_err(err.to_string()))?;

    out.truncate(frames_written);
    out.resize(expected_len(input_len, from, to), 0.0);
    Ok(out)
}

fn expected_len(input_len: usize, from: u32, to: u32) -> usize {
    (input_len as f64 * to as f64 / from as f64).round().max(1.0) as usize
}
