use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::labels::{DiseaseLabel, LABEL_COUNT};

/// Per-label probabilities in the fixed output order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    values: [f32; LABEL_COUNT],
}

impl ClassProbabilities {
    /// Build from one classifier output row, rescaled to sum to one.
    ///
    /// Rows with the wrong width, a negative or non-finite entry, or a zero
    /// total are rejected.
    pub fn from_row(row: &[f32]) -> Result<Self, String> {
        if row.len() != LABEL_COUNT {
            return Err(format!(
                "expected {LABEL_COUNT} probabilities, got {}",
                row.len()
            ));
        }
        if let Some(bad) = row.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(format!("invalid probability {bad}"));
        }
        let total: f64 = row.iter().map(|&p| p as f64).sum();
        if total <= 0.0 {
            return Err("probabilities sum to zero".to_string());
        }
        let mut values = [0.0_f32; LABEL_COUNT];
        for (slot, &p) in values.iter_mut().zip(row) {
            *slot = (p as f64 / total) as f32;
        }
        Ok(Self { values })
    }

    pub fn get(&self, label: DiseaseLabel) -> f32 {
        self.values[label.index()]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (DiseaseLabel, f32)> + '_ {
        DiseaseLabel::ALL.iter().copied().zip(self.values.iter().copied())
    }

    pub fn sum(&self) -> f32 {
        self.values.iter().sum()
    }

    /// Most probable label; ties go to the lowest index.
    pub fn argmax(&self) -> (DiseaseLabel, f32) {
        let mut best = 0;
        for (idx, &p) in self.values.iter().enumerate().skip(1) {
            if p > self.values[best] {
                best = idx;
            }
        }
        (DiseaseLabel::ALL[best], self.values[best])
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LABEL_COUNT))?;
        for (label, p) in self.iter() {
            map.serialize_entry(label.as_str(), &p)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_resolve_to_lowest_index() {
        let probs = ClassProbabilities::from_row(&[0.1, 0.3, 0.3, 0.1, 0.1, 0.05, 0.05]).unwrap();
        let (label, confidence) = probs.argmax();
        assert_eq!(label, DiseaseLabel::Asthma);
        assert!((confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn uniform_row_predicts_normal() {
        let probs = ClassProbabilities::from_row(&[1.0 / 7.0; 7]).unwrap();
        assert_eq!(probs.argmax().0, DiseaseLabel::Normal);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn drifted_rows_are_rescaled() {
        let probs = ClassProbabilities::from_row(&[2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0]).unwrap();
        assert_eq!(probs.get(DiseaseLabel::LongCovid), 0.5);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(ClassProbabilities::from_row(&[0.5, 0.5]).is_err());
        assert!(ClassProbabilities::from_row(&[f32::NAN, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_err());
        assert!(ClassProbabilities::from_row(&[-0.1, 1.1, 0.0, 0.0, 0.0, 0.0, 0.0]).is_err());
        assert!(ClassProbabilities::from_row(&[0.0; 7]).is_err());
    }

    #[test]
    fn serializes_as_map_in_label_order() {
        let probs = ClassProbabilities::from_row(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let json = serde_json::to_string(&probs).unwrap();
        assert!(json.starts_with("{\"Normal\":1.0,\"Asthma\":0.0,\"COPD\":0.0"));
        assert!(json.ends_with("\"Long-COVID\":0.0}"));
    }
}
