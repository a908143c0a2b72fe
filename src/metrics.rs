//! Evaluation metrics for the seven-class classifier.

use serde::Serialize;

use crate::labels::{DiseaseLabel, LABEL_COUNT};

/// Confusion matrix for a `K`-class classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Matrix over the disease labels from paired truth/prediction lists.
    pub fn from_labels(truth: &[DiseaseLabel], predicted: &[DiseaseLabel]) -> Self {
        let mut cm = Self::new(LABEL_COUNT);
        for (t, p) in truth.iter().zip(predicted) {
            cm.add(t.index(), p.index());
        }
        cm
    }

    /// Out-of-range indices are ignored.
    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }

    pub fn row(&self, truth: usize) -> &[u32] {
        let k = self.n_classes;
        &self.counts[truth * k..(truth + 1) * k]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    pub f1: f32,
    /// Number of true examples of the class.
    pub support: u32,
}

pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    (0..k)
        .map(|class_idx| {
            let tp = cm.get(class_idx, class_idx) as f32;
            let support: u32 = cm.row(class_idx).iter().sum();
            let fn_ = support as f32 - tp;
            let fp: f32 = (0..k)
                .filter(|&i| i != class_idx)
                .map(|i| cm.get(i, class_idx) as f32)
                .sum();
            let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
            let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            PerClassStats {
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = (0..cm.n_classes).map(|i| cm.get(i, i) as u64).sum();
    correct as f32 / total as f32
}

/// Unweighted mean F1 over classes with support.
pub fn macro_f1(stats: &[PerClassStats]) -> f32 {
    let supported: Vec<f32> = stats
        .iter()
        .filter(|s| s.support > 0)
        .map(|s| s.f1)
        .collect();
    if supported.is_empty() {
        0.0
    } else {
        supported.iter().sum::<f32>() / supported.len() as f32
    }
}

/// Macro one-vs-rest ROC-AUC from per-row class scores.
///
/// Classes without both positives and negatives are left out of the mean;
/// `None` when no class qualifies.
pub fn roc_auc_ovr_macro(truth: &[usize], scores: &[Vec<f32>], n_classes: usize) -> Option<f32> {
    let mut aucs = Vec::new();
    for class_idx in 0..n_classes {
        let pairs: Vec<(f32, bool)> = truth
            .iter()
            .zip(scores)
            .filter_map(|(&t, row)| row.get(class_idx).map(|&s| (s, t == class_idx)))
            .collect();
        if let Some(auc) = binary_auc(&pairs) {
            aucs.push(auc);
        }
    }
    if aucs.is_empty() {
        None
    } else {
        Some((aucs.iter().sum::<f64>() / aucs.len() as f64) as f32)
    }
}

/// Mann-Whitney AUC with average ranks for tied scores.
fn binary_auc(pairs: &[(f32, bool)]) -> Option<f64> {
    let positives = pairs.iter().filter(|(_, pos)| *pos).count();
    let negatives = pairs.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut rank_sum = 0.0_f64;
    let mut start = 0;
    while start < sorted.len() {
        let mut end = start + 1;
        while end < sorted.len() && sorted[end].0 == sorted[start].0 {
            end += 1;
        }
        // Ranks are 1-based; a tie group shares the mean of its ranks.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = sorted[start..end].iter().filter(|(_, pos)| *pos).count();
        rank_sum += avg_rank * tied_positives as f64;
        start = end;
    }
    let p = positives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Summary printed by the evaluation tool.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f32,
    pub macro_f1: f32,
    pub roc_auc_ovr_macro: Option<f32>,
    pub per_class: Vec<(DiseaseLabel, PerClassStats)>,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    /// Report from truth labels and per-row probability vectors in label order.
    pub fn from_scores(truth: &[DiseaseLabel], scores: &[Vec<f32>]) -> Self {
        let predicted: Vec<DiseaseLabel> = scores.iter().map(|row| argmax_label(row)).collect();
        let confusion = ConfusionMatrix::from_labels(truth, &predicted);
        let stats = precision_recall_by_class(&confusion);
        let truth_idx: Vec<usize> = truth.iter().map(|label| label.index()).collect();
        Self {
            accuracy: accuracy(&confusion),
            macro_f1: macro_f1(&stats),
            roc_auc_ovr_macro: roc_auc_ovr_macro(&truth_idx, scores, LABEL_COUNT),
            per_class: DiseaseLabel::ALL.into_iter().zip(stats).collect(),
            confusion,
        }
    }

    /// Fixed-width text table.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{:<14}{:>10}{:>10}{:>10}{:>9}\n",
            "label", "precision", "recall", "f1", "support"
        );
        for (label, stats) in &self.per_class {
            out.push_str(&format!(
                "{:<14}{:>10.3}{:>10.3}{:>10.3}{:>9}\n",
                label.as_str(),
                stats.precision,
                stats.recall,
                stats.f1,
                stats.support
            ));
        }
        out.push_str(&format!("\naccuracy  {:.4}\nmacro f1  {:.4}\n", self.accuracy, self.macro_f1));
        match self.roc_auc_ovr_macro {
            Some(auc) => out.push_str(&format!("roc auc   {auc:.4}\n")),
            None => out.push_str("roc auc   n/a\n"),
        }
        out.push_str("\nconfusion (rows = truth)\n");
        for truth in 0..self.confusion.n_classes {
            let row: Vec<String> = self
                .confusion
                .row(truth)
                .iter()
                .map(|v| format!("{v:>6}"))
                .collect();
            out.push_str(&row.concat());
            out.push('\n');
        }
        out
    }
}

/// Highest-scoring label; ties go to the lowest index.
fn argmax_label(row: &[f32]) -> DiseaseLabel {
    let mut best = 0;
    for (idx, &v) in row.iter().enumerate().take(LABEL_COUNT) {
        if v > row[best] {
            best = idx;
        }
    }
    DiseaseLabel::ALL[best]
}
