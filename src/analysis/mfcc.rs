use ndarray::{Array2, Axis};

/// Smallest power considered before taking the logarithm.
pub(crate) const AMIN: f32 = 1e-10;
/// Dynamic range kept below the loudest value.
pub(crate) const TOP_DB: f32 = 80.0;
/// Regression window for delta features.
pub const DELTA_WIDTH: usize = 9;

/// Reference level for [`power_to_db`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DbReference {
    /// Absolute dB (reference power 1.0).
    Unit,
    /// Relative to the loudest value of the input.
    Max,
}

/// `10·log10(max(AMIN, S) / ref)`, floored at `max - TOP_DB`.
pub(crate) fn power_to_db(power: &Array2<f32>, reference: DbReference) -> Array2<f32> {
    let ref_value = match reference {
        DbReference::Unit => 1.0_f32,
        DbReference::Max => power.iter().fold(0.0_f32, |m, &v| m.max(v)),
    };
    let ref_db = 10.0 * ref_value.max(AMIN).log10();
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10() - ref_db);
    let floor = db.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v)) - TOP_DB;
    db.mapv_inplace(|v| v.max(floor));
    db
}

/// Orthonormal DCT-II basis truncated to the first `count` coefficients.
pub(crate) struct DctBasis {
    basis: Array2<f32>,
}

impl DctBasis {
    pub(crate) fn new(count: usize, inputs: usize) -> Self {
        let n = inputs.max(1) as f64;
        let basis = Array2::from_shape_fn((count, inputs), |(k, m)| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            let angle = std::f64::consts::PI * k as f64 * (2.0 * m as f64 + 1.0) / (2.0 * n);
            (scale * angle.cos()) as f32
        });
        Self { basis }
    }

    /// Transform each column of `(inputs, frames)` into `(count, frames)`.
    pub(crate) fn apply(&self, values: &Array2<f32>) -> Array2<f32> {
        self.basis.dot(values)
    }
}

/// First- and second-order deltas along the time axis, stacked under `values`.
pub(crate) fn stack_with_deltas(values: &Array2<f32>) -> Array2<f32> {
    let rows = values.nrows();
    let mut out = Array2::<f32>::zeros((rows * 3, values.ncols()));
    out.slice_mut(ndarray::s![..rows, ..]).assign(values);
    out.slice_mut(ndarray::s![rows..2 * rows, ..])
        .assign(&delta(values, 1));
    out.slice_mut(ndarray::s![2 * rows.., ..])
        .assign(&delta(values, 2));
    out
}

/// Savitzky-Golay derivative of `order` (1 or 2) along the time axis.
///
/// Matches a local polynomial fit of degree `order` over [`DELTA_WIDTH`]
/// frames; edge frames reuse the nearest fully-supported estimate. Short inputs
/// shrink the window to the largest odd width that fits, and inputs shorter
/// than three frames get zero deltas.
pub(crate) fn delta(values: &Array2<f32>, order: usize) -> Array2<f32> {
    let frames = values.ncols();
    let mut out = Array2::<f32>::zeros(values.dim());
    let width = effective_width(frames);
    if width < 3 || !(1..=2).contains(&order) {
        return out;
    }
    let half = width / 2;
    let coeffs = savgol_coefficients(half, order);
    for (row_in, mut row_out) in values.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        for center in half..frames - half {
            let mut acc = 0.0_f64;
            for (j, &c) in coeffs.iter().enumerate() {
                acc += c * row_in[center + j - half] as f64;
            }
            row_out[center] = acc as f32;
        }
        let first = row_out[half];
        let last = row_out[frames - half - 1];
        for t in 0..half {
            row_out[t] = first;
            row_out[frames - 1 - t] = last;
        }
    }
    out
}

fn effective_width(frames: usize) -> usize {
    let width = DELTA_WIDTH.min(frames);
    if width % 2 == 0 { width - 1 } else { width }
}

fn savgol_coefficients(half: usize, order: usize) -> Vec<f64> {
    let offsets: Vec<f64> = (-(half as i64)..=half as i64).map(|n| n as f64).collect();
    let count = offsets.len() as f64;
    let sum_sq: f64 = offsets.iter().map(|n| n * n).sum();
    if order == 1 {
        return offsets.iter().map(|n| n / sum_sq).collect();
    }
    let mean_sq = sum_sq / count;
    let denom: f64 = offsets.iter().map(|n| (n * n - mean_sq).powi(2)).sum();
    offsets
        .iter()
        .map(|n| 2.0 * (n * n - mean_sq) / denom)
        .collect()
}
