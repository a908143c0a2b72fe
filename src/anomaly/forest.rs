//! Isolation forest over standardized feature rows.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::scaler::StandardScaler;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Training rows viewed through a fitted scaler, without materializing the scaled copy.
pub(crate) struct ScaledRows<'a> {
    pub(crate) rows: &'a [Vec<f32>],
    pub(crate) scaler: &'a StandardScaler,
}

impl ScaledRows<'_> {
    #[inline]
    fn value(&self, row: usize, dim: usize) -> f32 {
        self.scaler.scale_value(dim, self.rows[row][dim])
    }

    fn dim(&self) -> usize {
        self.scaler.dim()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Node {
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        size: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(data: &ScaledRows<'_>, samples: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, samples, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &ScaledRows<'_>,
        samples: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::Leaf {
            size: samples.len() as u32,
        });
        if depth >= max_depth || samples.len() <= 1 {
            return id;
        }
        let Some((feature, threshold)) = pick_split(data, &samples, rng) else {
            return id;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&row| data.value(row, feature) < threshold);
        let left = self.grow(data, left, depth + 1, max_depth, rng);
        let right = self.grow(data, right, depth + 1, max_depth, rng);
        self.nodes[id as usize] = Node::Split {
            feature: feature as u32,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `row` is isolated, plus the expected depth of its leaf population.
    fn path_length(&self, row: &[f32]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0.0_f64;
        loop {
            match self.nodes.get(node) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature as usize).copied().unwrap_or(0.0);
                    let next = if value < *threshold { *left } else { *right };
                    node = next as usize;
                    depth += 1.0;
                }
                Some(Node::Leaf { size }) => return depth + average_path_length(*size as usize),
                None => return depth,
            }
        }
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty isolation tree".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                let in_range = |child: u32| (child as usize) > idx && (child as usize) < self.nodes.len();
                if *feature as usize >= dim || !in_range(*left) || !in_range(*right) {
                    return Err(format!("malformed split node {idx}"));
                }
            }
        }
        Ok(())
    }
}

/// Random feature with spread in this node and a uniform threshold inside its range.
fn pick_split(data: &ScaledRows<'_>, samples: &[usize], rng: &mut StdRng) -> Option<(usize, f32)> {
    let dim = data.dim();
    if dim == 0 {
        return None;
    }
    let attempts = dim.min(64);
    for _ in 0..attempts {
        let feature = rng.random_range(0..dim);
        let (min, max) = samples.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &row| {
            let v = data.value(row, feature);
            (lo.min(v), hi.max(v))
        });
        if max > min {
            let threshold = rng.random_range(min..max);
            return Some((feature, threshold));
        }
    }
    None
}

/// Expected unsuccessful-search depth in a binary search tree of `n` nodes.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IsolationForest {
    pub(crate) max_samples: usize,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub(crate) fn fit(data: &ScaledRows<'_>, n_estimators: usize, max_samples: usize, seed: u64) -> Self {
        let n = data.rows.len();
        if n == 0 {
            return Self {
                max_samples: 0,
                trees: Vec::new(),
            };
        }
        let max_samples = max_samples.clamp(1, n);
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;
        let mut master = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..n_estimators).map(|_| master.random()).collect();
        let trees = tree_seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let samples = index::sample(&mut rng, n, max_samples).into_vec();
                IsolationTree::build(data, samples, max_depth, &mut rng)
            })
            .collect();
        Self { max_samples, trees }
    }

    /// `-2^(-E[h(x)] / c(max_samples))`: lower is more anomalous, range `[-1, 0)`.
    pub(crate) fn score(&self, scaled_row: &[f32]) -> f32 {
        if self.trees.is_empty() {
            return -0.5;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(scaled_row))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.max_samples).max(f64::MIN_POSITIVE);
        (-(2.0_f64.powf(-mean_depth / norm))) as f32
    }

    pub(crate) fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub(crate) fn validate(&self, dim: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("isolation forest has no trees".to_string());
        }
        self.trees.iter().try_for_each(|tree| tree.validate(dim))
    }
}

/// Decision offset: the `floor(contamination * n)`-th smallest training score.
///
/// With "anomalous iff score < offset", at most `contamination * n` training
/// rows fall below it.
pub(crate) fn contamination_offset(scores: &[f32], contamination: f32) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f32::total_cmp);
    let k = ((contamination.clamp(0.0, 1.0) as f64) * sorted.len() as f64).floor() as usize;
    sorted[k.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(7);
        (0..n)
            .map(|_| (0..4).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn average_path_length_matches_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244).abs() < 1e-2, "c(256) = {c256}");
    }

    #[test]
    fn outlier_scores_lower_than_inliers() {
        let rows = cluster(200);
        let scaler = StandardScaler::fit(&rows);
        let data = ScaledRows {
            rows: &rows,
            scaler: &scaler,
        };
        let forest = IsolationForest::fit(&data, 100, 256, 42);
        assert_eq!(forest.max_samples, 200);
        assert_eq!(forest.tree_count(), 100);
        let inlier = forest.score(&scaler.transform(&[0.0, 0.0, 0.0, 0.0]));
        let outlier = forest.score(&scaler.transform(&[8.0, -8.0, 8.0, -8.0]));
        assert!(outlier < inlier, "outlier {outlier} inlier {inlier}");
        assert!((-1.0..0.0).contains(&outlier));
        forest.validate(4).unwrap();
    }

    #[test]
    fn fitting_is_reproducible_for_a_seed() {
        let rows = cluster(64);
        let scaler = StandardScaler::fit(&rows);
        let data = ScaledRows {
            rows: &rows,
            scaler: &scaler,
        };
        let a = IsolationForest::fit(&data, 10, 256, 42);
        let b = IsolationForest::fit(&data, 10, 256, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn constant_rows_become_single_leaves() {
        let rows = vec![vec![1.0_f32, 2.0]; 10];
        let scaler = StandardScaler::fit(&rows);
        let data = ScaledRows {
            rows: &rows,
            scaler: &scaler,
        };
        let forest = IsolationForest::fit(&data, 3, 256, 1);
        let score = forest.score(&scaler.transform(&[1.0, 2.0]));
        assert!((score + 0.5).abs() < 1e-6);
    }

    #[test]
    fn offset_bounds_the_flagged_fraction() {
        let scores: Vec<f32> = (0..24).map(|i| -0.3 - i as f32 * 0.01).collect();
        let offset = contamination_offset(&scores, 0.1);
        let flagged = scores.iter().filter(|&&s| s < offset).count();
        assert_eq!(flagged, 2);
        assert_eq!(contamination_offset(&[-0.5], 0.5), -0.5);
    }
}
