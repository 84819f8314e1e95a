use log::debug;
use ndarray::{ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Estimator, RegressionTree, TreeParams};
use crate::{MlErr, Result, scaling::check_width};

/// The hyper-parameters of a `RandomForest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub bootstrap: bool,
    pub seed: u64,
    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            bootstrap: true,
            seed: 42,
            tree: TreeParams::default(),
        }
    }
}

/// A bagged ensemble of regression trees, the prediction is the mean of its trees.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    width: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fits a new forest.
    ///
    /// Trees are fitted in parallel, each one with its own rng seeded with `seed + tree index`,
    /// so the result only depends on the data and `params`.
    ///
    /// # Arguments
    /// * `x` - The feature matrix.
    /// * `y` - The targets.
    /// * `params` - The forest's hyper-parameters.
    ///
    /// # Returns
    /// The fitted forest or an error if the data or hyper-parameters are invalid.
    pub fn fit(x: ArrayView2<f32>, y: ArrayView1<f32>, params: ForestParams) -> Result<Self> {
        if params.n_estimators == 0 {
            return Err(MlErr::InvalidHyperParam {
                name: "n_estimators",
                reason: "must be at least 1".into(),
            });
        }

        let n = x.nrows();
        if n == 0 {
            return Err(MlErr::EmptyDataset);
        }
        check_width(y.len(), n)?;

        debug!(trees = params.n_estimators, rows = n; "fitting random forest");

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let indices = if params.bootstrap {
                    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };

                RegressionTree::fit(x, y, indices, params.tree)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            width: x.ncols(),
            trees,
        })
    }

    /// Rebuilds a forest from its trees.
    ///
    /// # Returns
    /// The forest or an error if there are no trees or they disagree on the input width.
    pub fn from_trees(width: usize, trees: Vec<RegressionTree>) -> Result<Self> {
        if trees.is_empty() {
            return Err(MlErr::SizeMismatch {
                what: "forest trees",
                got: 0,
                expected: 1,
            });
        }

        if let Some(tree) = trees.iter().find(|t| t.input_width() != width) {
            return Err(MlErr::SizeMismatch {
                what: "tree input width",
                got: tree.input_width(),
                expected: width,
            });
        }

        Ok(Self { width, trees })
    }

    /// The forest's trees.
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    fn tree_predictions(&self, row: &[f32]) -> Result<Vec<f32>> {
        check_width(row.len(), self.width)?;
        self.trees.iter().map(|t| t.predict(row)).collect()
    }
}

impl Estimator for RandomForest {
    fn input_width(&self) -> usize {
        self.width
    }

    fn predict(&self, row: &[f32]) -> Result<f32> {
        let preds = self.tree_predictions(row)?;
        let sum: f64 = preds.iter().map(|&p| p as f64).sum();
        Ok((sum / preds.len() as f64) as f32)
    }

    fn spread(&self, row: &[f32]) -> Result<Option<f32>> {
        let (_, spread) = self.predict_with_spread(row)?;
        Ok(spread)
    }

    /// Walks every tree once for both the mean and the standard deviation of their predictions.
    fn predict_with_spread(&self, row: &[f32]) -> Result<(f32, Option<f32>)> {
        let preds = self.tree_predictions(row)?;
        let n = preds.len() as f64;
        let mean = preds.iter().map(|&p| p as f64).sum::<f64>() / n;
        let var = preds.iter().map(|&p| (p as f64 - mean).powi(2)).sum::<f64>() / n;
        Ok((mean as f32, Some(var.sqrt() as f32)))
    }
}
