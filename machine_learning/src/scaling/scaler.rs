use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{IdentityScaler, StandardScaler};
use crate::{MlErr, Result};

/// Maps raw feature rows into the space an estimator was fitted on.
pub trait Scaler {
    /// Returns the amount of features this scaler expects (and produces).
    fn width(&self) -> usize;

    /// Transforms a single row into `out`.
    ///
    /// # Arguments
    /// * `row` - The raw features, in contract order.
    /// * `out` - The buffer where the normalized features are written.
    ///
    /// # Returns
    /// An error if either buffer doesn't match the scaler's width.
    fn transform_into(&self, row: &[f32], out: &mut [f32]) -> Result<()>;

    /// Transforms a single row into a newly allocated one.
    fn transform(&self, row: &[f32]) -> Result<Vec<f32>> {
        let mut out = vec![0.0; self.width()];
        self.transform_into(row, &mut out)?;
        Ok(out)
    }

    /// Transforms every row of a feature matrix.
    fn transform_matrix(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_width(x.ncols(), self.width())?;

        let mut out = Array2::zeros(x.raw_dim());
        for (row, mut out_row) in x.rows().into_iter().zip(out.rows_mut()) {
            let row = row.to_vec();
            let mut buf = vec![0.0; row.len()];
            self.transform_into(&row, &mut buf)?;
            out_row.assign(&ArrayView1::from(buf.as_slice()));
        }

        Ok(out)
    }
}

/// The scaler variant tag, as recorded in artifact headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    Standard,
    Identity,
}

/// Every scaler a model bundle can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureScaler {
    Standard(StandardScaler),
    Identity(IdentityScaler),
}
use FeatureScaler::*;

impl FeatureScaler {
    /// Returns the tag of this variant.
    pub fn kind(&self) -> ScalerKind {
        match self {
            Standard(_) => ScalerKind::Standard,
            Identity(_) => ScalerKind::Identity,
        }
    }
}

impl Scaler for FeatureScaler {
    fn width(&self) -> usize {
        match self {
            Standard(s) => s.width(),
            Identity(s) => s.width(),
        }
    }

    fn transform_into(&self, row: &[f32], out: &mut [f32]) -> Result<()> {
        match self {
            Standard(s) => s.transform_into(row, out),
            Identity(s) => s.transform_into(row, out),
        }
    }
}

impl From<StandardScaler> for FeatureScaler {
    fn from(value: StandardScaler) -> Self {
        Standard(value)
    }
}

impl From<IdentityScaler> for FeatureScaler {
    fn from(value: IdentityScaler) -> Self {
        Identity(value)
    }
}

/// Checks a buffer length against the width a scaler or estimator expects.
pub(crate) fn check_width(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what: "feature row",
            got,
            expected,
        });
    }

    Ok(())
}
