use serde::{Deserialize, Serialize};

/// Scales below this are treated as constant features.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Per-dimension zero-mean / unit-variance scaler (population variance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    /// Standard deviation per dimension; constant dimensions store 1.0.
    pub scale: Vec<f32>,
}

impl StandardScaler {
    /// Fit on rows that all have the same, non-zero length.
    pub(crate) fn fit(rows: &[Vec<f32>]) -> Self {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut sum = vec![0.0_f64; dim];
        for row in rows {
            for (acc, &v) in sum.iter_mut().zip(row) {
                *acc += v as f64;
            }
        }
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();
        let mut var = vec![0.0_f64; dim];
        for row in rows {
            for ((acc, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
                let d = v as f64 - m;
                *acc += d * d;
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std < MIN_SCALE { 1.0 } else { std as f32 }
            })
            .collect();
        Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Scaled value of one dimension.
    #[inline]
    pub(crate) fn scale_value(&self, dim: usize, value: f32) -> f32 {
        (value - self.mean[dim]) / self.scale[dim]
    }

    pub fn transform(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .enumerate()
            .map(|(dim, &v)| self.scale_value(dim, v))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.mean.len() != self.scale.len() {
            return Err("scaler mean/scale length mismatch".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scaler scale must be finite and > 0".to_string());
        }
        Ok(())
    }
}
