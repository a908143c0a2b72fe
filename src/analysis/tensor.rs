use ndarray::{Array2, Array3, Array4, ArrayView3, Axis, concatenate, s};

use super::{FEATURE_BINS, FeatureError};

/// Classifier input for one clip: `(time_frames, 248, 1)`.
///
/// Rows `0..120` hold MFCC, Δ and ΔΔ; rows `120..248` hold the log-mel spectrogram.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Array3<f32>,
}

impl FeatureTensor {
    /// Wrap an existing array, checking the feature and channel axes.
    pub fn new(data: Array3<f32>) -> Result<Self, FeatureError> {
        let (frames, bins, channels) = data.dim();
        if bins != FEATURE_BINS || channels != 1 || frames == 0 {
            return Err(FeatureError::InvalidInput(format!(
                "feature tensor must be (T>0, {FEATURE_BINS}, 1), got ({frames}, {bins}, {channels})"
            )));
        }
        Ok(Self { data })
    }

    /// Stack `(120, T1)` cepstral and `(128, T2)` log-mel blocks on `min(T1, T2)` frames.
    pub(crate) fn from_blocks(
        cepstral: &Array2<f32>,
        log_mel: &Array2<f32>,
    ) -> Result<Self, FeatureError> {
        let frames = cepstral.ncols().min(log_mel.ncols());
        let stacked = concatenate(
            Axis(0),
            &[
                cepstral.slice(s![.., ..frames]),
                log_mel.slice(s![.., ..frames]),
            ],
        )
        .map_err(|err| FeatureError::InvalidInput(err.to_string()))?;
        let data = stacked.reversed_axes().insert_axis(Axis(2));
        // Own a standard (row-major) layout so flatten order is stable.
        Self::new(data.as_standard_layout().into_owned())
    }

    /// Rebuild from a row-major flat buffer written by [`FeatureTensor::flatten`].
    pub fn from_flat(values: Vec<f32>, time_frames: usize) -> Result<Self, FeatureError> {
        let data = Array3::from_shape_vec((time_frames, FEATURE_BINS, 1), values)
            .map_err(|err| FeatureError::InvalidInput(err.to_string()))?;
        Self::new(data)
    }

    pub fn time_frames(&self) -> usize {
        self.data.dim().0
    }

    pub fn feature_bins(&self) -> usize {
        self.data.dim().1
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Row-major copy of every value.
    pub fn flatten(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// `(1, T, 248, 1)` view with a leading batch axis.
    pub fn with_batch_axis(&self) -> Array4<f32> {
        self.data.clone().insert_axis(Axis(0))
    }
}
