use std::fmt;

use serde::{Deserialize, Serialize};

use crate::labels::DiseaseLabel;

/// Confidence above which a non-normal prediction is high risk.
pub const HIGH_RISK_CONFIDENCE: f32 = 0.8;
/// Confidence above which a non-normal prediction is medium risk.
pub const MEDIUM_RISK_CONFIDENCE: f32 = 0.6;

/// Coarse triage level derived from a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk of a predicted label at a given confidence.
///
/// Rules apply in order: `Normal` is always low, then `> 0.8` is high,
/// `(0.6, 0.8]` is medium and anything else is low. A low-confidence disease
/// prediction is therefore reported as low risk.
pub fn risk_level(label: DiseaseLabel, confidence: f32) -> RiskLevel {
    if label == DiseaseLabel::Normal {
        RiskLevel::Low
    } else if confidence > HIGH_RISK_CONFIDENCE {
        RiskLevel::High
    } else if confidence > MEDIUM_RISK_CONFIDENCE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
