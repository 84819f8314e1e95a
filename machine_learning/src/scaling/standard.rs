use ndarray::{ArrayView2, Axis};

use super::{Scaler, scaler::check_width};
use crate::{MlErr, Result};

/// Standardizes every feature to zero mean and unit variance: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl StandardScaler {
    /// Fits a new `StandardScaler` over the columns of `x`.
    ///
    /// The scale is the population standard deviation, columns without variance get a scale
    /// of `1.0` so they're only centered.
    ///
    /// # Arguments
    /// * `x` - The feature matrix, one sample per row.
    ///
    /// # Returns
    /// The fitted scaler or an error if `x` has no rows.
    pub fn fit(x: ArrayView2<f32>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(MlErr::EmptyDataset);
        }

        let mean = x.mean_axis(Axis(0)).ok_or(MlErr::EmptyDataset)?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > f32::EPSILON { s } else { 1.0 });

        Ok(Self {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        })
    }

    /// Rebuilds a `StandardScaler` from its fitted statistics.
    ///
    /// # Arguments
    /// * `mean` - The per feature mean.
    /// * `scale` - The per feature scale, every value must be finite and non zero.
    pub fn from_parts(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self> {
        check_width(scale.len(), mean.len())?;

        if let Some(s) = scale.iter().find(|s| !s.is_finite() || **s == 0.0) {
            return Err(MlErr::InvalidHyperParam {
                name: "scale",
                reason: format!("every scale must be finite and non zero, got {s}"),
            });
        }

        Ok(Self { mean, scale })
    }

    /// The fitted per feature mean.
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// The fitted per feature scale.
    pub fn scale(&self) -> &[f32] {
        &self.scale
    }
}

impl Scaler for StandardScaler {
    fn width(&self) -> usize {
        self.mean.len()
    }

    fn transform_into(&self, row: &[f32], out: &mut [f32]) -> Result<()> {
        check_width(row.len(), self.width())?;
        check_width(out.len(), self.width())?;

        for (((o, x), m), s) in out.iter_mut().zip(row).zip(&self.mean).zip(&self.scale) {
            *o = (x - m) / s;
        }

        Ok(())
    }
}
