use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// The evaluation metrics recorded alongside a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub rmse: f32,
    pub mae: f32,
    pub r2: f32,
}

impl EvalMetrics {
    /// Evaluates predictions against their expected targets.
    ///
    /// # Arguments
    /// * `y_true` - The expected targets.
    /// * `y_pred` - The model's predictions.
    ///
    /// # Returns
    /// The metrics or an error if the slices are empty or differ in length.
    pub fn evaluate(y_true: ArrayView1<f32>, y_pred: ArrayView1<f32>) -> Result<Self> {
        Ok(Self {
            rmse: rmse(y_true, y_pred)?,
            mae: mae(y_true, y_pred)?,
            r2: r2(y_true, y_pred)?,
        })
    }
}

fn check(y_true: ArrayView1<f32>, y_pred: ArrayView1<f32>) -> Result<()> {
    if y_true.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    if y_true.len() != y_pred.len() {
        return Err(MlErr::SizeMismatch {
            what: "predictions",
            got: y_pred.len(),
            expected: y_true.len(),
        });
    }

    Ok(())
}

/// Root mean squared error.
pub fn rmse(y_true: ArrayView1<f32>, y_pred: ArrayView1<f32>) -> Result<f32> {
    check(y_true, y_pred)?;
    let mse = (&y_true - &y_pred).mapv(|e| e.powi(2)).mean().unwrap_or_default();
    Ok(mse.sqrt())
}

/// Mean absolute error.
pub fn mae(y_true: ArrayView1<f32>, y_pred: ArrayView1<f32>) -> Result<f32> {
    check(y_true, y_pred)?;
    Ok((&y_true - &y_pred).mapv(f32::abs).mean().unwrap_or_default())
}

/// Coefficient of determination. A constant target scores `1.0` when predicted exactly and
/// `0.0` otherwise.
pub fn r2(y_true: ArrayView1<f32>, y_pred: ArrayView1<f32>) -> Result<f32> {
    check(y_true, y_pred)?;

    let mean = y_true.mean().unwrap_or_default();
    let ss_res: f32 = (&y_true - &y_pred).mapv(|e| e.powi(2)).sum();
    let ss_tot: f32 = y_true.mapv(|y| (y - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}
