use std::fmt::{self, Display};

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{LinearRegression, RandomForest};
use crate::{Result, scaling::check_width};

/// A fitted model mapping a normalized feature row into a scalar prediction.
pub trait Estimator {
    /// Returns the amount of features this estimator expects.
    fn input_width(&self) -> usize;

    /// Predicts the target of a single row.
    ///
    /// # Arguments
    /// * `row` - The normalized features, in contract order.
    ///
    /// # Returns
    /// The prediction or an error if `row` doesn't match the input width.
    fn predict(&self, row: &[f32]) -> Result<f32>;

    /// Returns how much the members of an ensemble disagree on `row` (their standard
    /// deviation), or `None` when the estimator isn't an ensemble.
    fn spread(&self, row: &[f32]) -> Result<Option<f32>> {
        check_width(row.len(), self.input_width())?;
        Ok(None)
    }

    /// Returns both `predict(row)` and `spread(row)`.
    fn predict_with_spread(&self, row: &[f32]) -> Result<(f32, Option<f32>)> {
        Ok((self.predict(row)?, self.spread(row)?))
    }

    /// Predicts every row of a feature matrix.
    fn predict_matrix(&self, x: ArrayView2<f32>) -> Result<Array1<f32>> {
        check_width(x.ncols(), self.input_width())?;

        x.rows()
            .into_iter()
            .map(|row| self.predict(&row.to_vec()))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }
}

/// The estimator variant tag, as recorded in artifact headers and configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RandomForest,
    LinearRegression,
}

impl Algorithm {
    /// The stable name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RandomForest => "random_forest",
            Algorithm::LinearRegression => "linear_regression",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every estimator a model bundle can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Regressor {
    RandomForest(RandomForest),
    Linear(LinearRegression),
}

impl Regressor {
    /// Returns the tag of this variant.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::RandomForest(_) => Algorithm::RandomForest,
            Self::Linear(_) => Algorithm::LinearRegression,
        }
    }
}

impl Estimator for Regressor {
    fn input_width(&self) -> usize {
        match self {
            Self::RandomForest(m) => m.input_width(),
            Self::Linear(m) => m.input_width(),
        }
    }

    fn predict(&self, row: &[f32]) -> Result<f32> {
        match self {
            Self::RandomForest(m) => m.predict(row),
            Self::Linear(m) => m.predict(row),
        }
    }

    fn spread(&self, row: &[f32]) -> Result<Option<f32>> {
        match self {
            Self::RandomForest(m) => m.spread(row),
            Self::Linear(m) => m.spread(row),
        }
    }

    fn predict_with_spread(&self, row: &[f32]) -> Result<(f32, Option<f32>)> {
        match self {
            Self::RandomForest(m) => m.predict_with_spread(row),
            Self::Linear(m) => m.predict_with_spread(row),
        }
    }
}

impl From<RandomForest> for Regressor {
    fn from(value: RandomForest) -> Self {
        Self::RandomForest(value)
    }
}

impl From<LinearRegression> for Regressor {
    fn from(value: LinearRegression) -> Self {
        Self::Linear(value)
    }
}
