use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::Estimator;
use crate::{MlErr, Result, scaling::check_width};

/// The growth limits of a `RegressionTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    /// Checks the limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(MlErr::InvalidHyperParam {
                name: "max_depth",
                reason: "must be at least 1".into(),
            });
        }

        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(MlErr::InvalidHyperParam {
                name: "min_samples",
                reason: format!(
                    "min_samples_leaf must be >= 1 and min_samples_split >= 2, got {} and {}",
                    self.min_samples_leaf, self.min_samples_split
                ),
            });
        }

        Ok(())
    }
}

/// A node of a `RegressionTree`. Children always live after their parent in the node list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f32,
    },
}

/// A CART regression tree, split on the mean squared error.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    width: usize,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    score: f64,
}

impl RegressionTree {
    /// Fits a new tree over the given rows of `x`.
    ///
    /// # Arguments
    /// * `x` - The feature matrix.
    /// * `y` - The targets.
    /// * `indices` - The rows to fit on, may contain repetitions (bootstrapping).
    /// * `params` - The growth limits.
    ///
    /// # Returns
    /// The fitted tree or an error if there are no rows to fit on.
    pub fn fit(
        x: ArrayView2<f32>,
        y: ArrayView1<f32>,
        mut indices: Vec<usize>,
        params: TreeParams,
    ) -> Result<Self> {
        params.validate()?;
        check_width(y.len(), x.nrows())?;

        if indices.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let mut tree = Self {
            width: x.ncols(),
            nodes: Vec::new(),
        };
        tree.grow(x, y, &mut indices, 0, &params);
        Ok(tree)
    }

    /// Rebuilds a tree from its node list.
    ///
    /// # Arguments
    /// * `width` - The amount of features the tree splits on.
    /// * `nodes` - The nodes, the root being the first one.
    ///
    /// # Returns
    /// The tree or an error if a node references a missing feature or child.
    pub fn from_nodes(width: usize, nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(MlErr::SizeMismatch {
                what: "tree nodes",
                got: 0,
                expected: 1,
            });
        }

        let len = nodes.len();
        for (i, node) in nodes.iter().enumerate() {
            if let &Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if feature as usize >= width {
                    return Err(MlErr::SizeMismatch {
                        what: "tree split feature",
                        got: feature as usize,
                        expected: width,
                    });
                }

                for child in [left as usize, right as usize] {
                    if child <= i || child >= len {
                        return Err(MlErr::SizeMismatch {
                            what: "tree child index",
                            got: child,
                            expected: len,
                        });
                    }
                }
            }
        }

        Ok(Self { width, nodes })
    }

    /// The tree's nodes, the root being the first one.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Grows the subtree for `indices`, returns the index of its root.
    fn grow(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView1<f32>,
        indices: &mut [usize],
        depth: usize,
        params: &TreeParams,
    ) -> u32 {
        let id = self.nodes.len() as u32;
        let value = mean(y, indices);
        self.nodes.push(Node::Leaf { value });

        if depth >= params.max_depth || indices.len() < params.min_samples_split {
            return id;
        }

        let Some(best) = best_split(x, y, indices, params.min_samples_leaf) else {
            return id;
        };

        let mid = partition(indices, |i| x[[i, best.feature]] <= best.threshold);
        let (left_idx, right_idx) = indices.split_at_mut(mid);

        let left = self.grow(x, y, left_idx, depth + 1, params);
        let right = self.grow(x, y, right_idx, depth + 1, params);

        self.nodes[id as usize] = Node::Split {
            feature: best.feature as u32,
            threshold: best.threshold,
            left,
            right,
        };

        id
    }
}

impl Estimator for RegressionTree {
    fn input_width(&self) -> usize {
        self.width
    }

    fn predict(&self, row: &[f32]) -> Result<f32> {
        check_width(row.len(), self.width)?;

        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { value } => return Ok(value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[feature as usize] <= threshold {
                        left as usize
                    } else {
                        right as usize
                    };
                }
            }
        }
    }
}

fn mean(y: ArrayView1<f32>, indices: &[usize]) -> f32 {
    let sum: f64 = indices.iter().map(|&i| y[i] as f64).sum();
    (sum / indices.len() as f64) as f32
}

/// Finds the split that most reduces the squared error of `indices`, if any.
///
/// Minimizing the children's squared error is the same as maximizing
/// `sum_l^2 / n_l + sum_r^2 / n_r`, which only needs running sums.
fn best_split(
    x: ArrayView2<f32>,
    y: ArrayView1<f32>,
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<BestSplit> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i] as f64).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<BestSplit> = None;
    let mut sorted = indices.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_unstable_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += y[sorted[k]] as f64;

            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let here = x[[sorted[k], feature]];
            let next = x[[sorted[k + 1], feature]];
            if here == next {
                continue;
            }

            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;

            if score > parent_score + 1e-9 && best.as_ref().is_none_or(|b| score > b.score) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }

                best = Some(BestSplit {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}

/// Moves every index for which `pred` holds to the front, returns how many there are.
fn partition<F>(indices: &mut [usize], pred: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut mid = 0;
    for k in 0..indices.len() {
        if pred(indices[k]) {
            indices.swap(mid, k);
            mid += 1;
        }
    }
    mid
}
