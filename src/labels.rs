//! Fixed respiratory condition labels shared by training and inference.
//!
//! The label order is part of the classifier contract: index `i` of every
//! probability vector belongs to `DiseaseLabel::ALL[i]`. Reordering is a
//! breaking change for every persisted model and processed dataset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of classes produced by the classifier.
pub const LABEL_COUNT: usize = 7;

/// Respiratory condition predicted by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiseaseLabel {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Asthma")]
    Asthma,
    #[serde(rename = "COPD")]
    Copd,
    #[serde(rename = "Pneumonia")]
    Pneumonia,
    #[serde(rename = "Bronchitis")]
    Bronchitis,
    #[serde(rename = "Tuberculosis")]
    Tuberculosis,
    #[serde(rename = "Long-COVID")]
    LongCovid,
}

impl DiseaseLabel {
    /// All labels in classifier output order.
    pub const ALL: [DiseaseLabel; LABEL_COUNT] = [
        DiseaseLabel::Normal,
        DiseaseLabel::Asthma,
        DiseaseLabel::Copd,
        DiseaseLabel::Pneumonia,
        DiseaseLabel::Bronchitis,
        DiseaseLabel::Tuberculosis,
        DiseaseLabel::LongCovid,
    ];

    /// Position of the label in the classifier output.
    pub fn index(self) -> usize {
        match self {
            DiseaseLabel::Normal => 0,
            DiseaseLabel::Asthma => 1,
            DiseaseLabel::Copd => 2,
            DiseaseLabel::Pneumonia => 3,
            DiseaseLabel::Bronchitis => 4,
            DiseaseLabel::Tuberculosis => 5,
            DiseaseLabel::LongCovid => 6,
        }
    }

    /// Label at a classifier output index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name used in API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            DiseaseLabel::Normal => "Normal",
            DiseaseLabel::Asthma => "Asthma",
            DiseaseLabel::Copd => "COPD",
            DiseaseLabel::Pneumonia => "Pneumonia",
            DiseaseLabel::Bronchitis => "Bronchitis",
            DiseaseLabel::Tuberculosis => "Tuberculosis",
            DiseaseLabel::LongCovid => "Long-COVID",
        }
    }

    /// Directory name used by raw datasets (`data/raw/<dir>/*.wav`).
    pub fn dir_name(self) -> &'static str {
        match self {
            DiseaseLabel::Normal => "normal",
            DiseaseLabel::Asthma => "asthma",
            DiseaseLabel::Copd => "copd",
            DiseaseLabel::Pneumonia => "pneumonia",
            DiseaseLabel::Bronchitis => "bronchitis",
            DiseaseLabel::Tuberculosis => "tuberculosis",
            DiseaseLabel::LongCovid => "long_covid",
        }
    }

    /// Parse either a display name or a dataset directory name.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        Self::ALL.into_iter().find(|label| {
            label.as_str().eq_ignore_ascii_case(trimmed) || label.dir_name() == trimmed
        })
    }
}

impl fmt::Display for DiseaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
