use ndarray::{ArrayView1, ArrayView2, Axis};

use super::Estimator;
use crate::{MlErr, Result, scaling::check_width};

const RIDGE: f64 = 1e-9;
const PIVOT_EPS: f64 = 1e-12;

/// Ordinary least squares with an intercept: `y = coef . x + intercept`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    coef: Vec<f32>,
    intercept: f32,
}

impl LinearRegression {
    /// Fits a new linear model through the normal equations over centered data.
    ///
    /// # Arguments
    /// * `x` - The feature matrix.
    /// * `y` - The targets.
    ///
    /// # Returns
    /// The fitted model or an error if the data is empty or the system is singular.
    pub fn fit(x: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<Self> {
        let (n, d) = x.dim();
        if n == 0 {
            return Err(MlErr::EmptyDataset);
        }
        check_width(y.len(), n)?;

        let x = x.mapv(|v| v as f64);
        let y = y.mapv(|v| v as f64);
        let x_mean = x.mean_axis(Axis(0)).ok_or(MlErr::EmptyDataset)?;
        let y_mean = y.mean().ok_or(MlErr::EmptyDataset)?;

        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut gram = xc.t().dot(&xc);
        let rhs = xc.t().dot(&yc);

        let ridge = RIDGE * (gram.diag().sum() / d.max(1) as f64).max(1.0);
        gram.diag_mut().mapv_inplace(|v| v + ridge);

        let mut system: Vec<Vec<f64>> = gram
            .rows()
            .into_iter()
            .zip(rhs.iter())
            .map(|(row, &b)| row.iter().copied().chain([b]).collect())
            .collect();
        let w = solve(&mut system)?;

        let intercept = y_mean - w.iter().zip(x_mean.iter()).map(|(w, m)| w * m).sum::<f64>();

        Ok(Self {
            coef: w.into_iter().map(|w| w as f32).collect(),
            intercept: intercept as f32,
        })
    }

    /// Rebuilds a linear model from its fitted parameters.
    pub fn from_parts(coef: Vec<f32>, intercept: f32) -> Self {
        Self { coef, intercept }
    }

    /// The fitted coefficients, one per feature.
    pub fn coef(&self) -> &[f32] {
        &self.coef
    }

    /// The fitted intercept.
    pub fn intercept(&self) -> f32 {
        self.intercept
    }
}

impl Estimator for LinearRegression {
    fn input_width(&self) -> usize {
        self.coef.len()
    }

    fn predict(&self, row: &[f32]) -> Result<f32> {
        check_width(row.len(), self.coef.len())?;
        Ok(self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f32>() + self.intercept)
    }
}

/// Solves an augmented system `[A | b]` in place with partial pivoting.
fn solve(system: &mut [Vec<f64>]) -> Result<Vec<f64>> {
    let d = system.len();

    for col in 0..d {
        let pivot = (col..d)
            .max_by(|&a, &b| system[a][col].abs().total_cmp(&system[b][col].abs()))
            .ok_or(MlErr::SingularSystem)?;

        if system[pivot][col].abs() < PIVOT_EPS {
            return Err(MlErr::SingularSystem);
        }
        system.swap(col, pivot);

        for row in col + 1..d {
            let factor = system[row][col] / system[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=d {
                system[row][k] -= factor * system[col][k];
            }
        }
    }

    let mut w = vec![0.0; d];
    for row in (0..d).rev() {
        let tail: f64 = (row + 1..d).map(|k| system[row][k] * w[k]).sum();
        w[row] = (system[row][d] - tail) / system[row][row];
    }

    Ok(w)
}
