//! Seeded stratified train/validation/test split.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::DatasetError;
use crate::labels::{DiseaseLabel, LABEL_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|split| split.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item indices per split, each list ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    pub fn get(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `labels` into train/val/test, preserving class proportions.
///
/// Each class is shuffled with one seeded generator (classes visited in label
/// order). The test share is carved first, then validation takes
/// `val / (1 - test)` of the remainder. A singleton class stays in train.
pub fn stratified_split(
    labels: &[DiseaseLabel],
    test_fraction: f64,
    val_fraction: f64,
    seed: u64,
) -> Result<SplitIndices, DatasetError> {
    let valid = |f: f64| (0.0..1.0).contains(&f);
    if !valid(test_fraction) || !valid(val_fraction) || test_fraction + val_fraction >= 1.0 {
        return Err(DatasetError::InvalidSplitFractions {
            test: test_fraction,
            val: val_fraction,
        });
    }
    let mut by_class: [Vec<usize>; LABEL_COUNT] = Default::default();
    for (idx, label) in labels.iter().enumerate() {
        by_class[label.index()].push(idx);
    }
    let val_ratio = val_fraction / (1.0 - test_fraction);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = SplitIndices::default();
    for mut members in by_class {
        let n = members.len();
        if n == 0 {
            continue;
        }
        members.shuffle(&mut rng);
        let (test_n, val_n) = if n == 1 {
            (0, 0)
        } else {
            let test_n = ((n as f64) * test_fraction).round() as usize;
            let val_n = (((n - test_n.min(n)) as f64) * val_ratio).round() as usize;
            shrink_to_leave_train(n, test_n, val_n)
        };
        out.test.extend_from_slice(&members[..test_n]);
        out.val.extend_from_slice(&members[test_n..test_n + val_n]);
        out.train.extend_from_slice(&members[test_n + val_n..]);
    }
    out.train.sort_unstable();
    out.val.sort_unstable();
    out.test.sort_unstable();
    Ok(out)
}

fn shrink_to_leave_train(n: usize, mut test_n: usize, mut val_n: usize) -> (usize, usize) {
    while test_n + val_n >= n {
        if val_n > 0 {
            val_n -= 1;
        } else if test_n > 0 {
            test_n -= 1;
        } else {
            break;
        }
    }
    (test_n, val_n)
}
