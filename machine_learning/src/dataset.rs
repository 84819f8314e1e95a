use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

/// A tabular dataset: one row of features per sample plus a scalar target.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array1<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The feature matrix, one sample per row.
    /// * `y` - The target of each sample.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the amount of rows and targets differ.
    pub fn new(x: Array2<f32>, y: Array1<f32>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: y.len(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    /// Creates a new `Dataset` from a flat buffer where every row holds `x_size` features
    /// followed by its target.
    ///
    /// # Arguments
    /// * `data` - The interleaved samples.
    /// * `x_size` - The amount of features per sample.
    ///
    /// # Returns
    /// A new `Dataset` or an error if `data` can't be split in whole rows.
    pub fn from_interleaved(data: Vec<f32>, x_size: usize) -> Result<Self> {
        let row_size = x_size + 1;
        if x_size == 0 || data.len() % row_size != 0 {
            return Err(MlErr::SizeMismatch {
                what: "interleaved dataset",
                got: data.len() % row_size.max(1),
                expected: 0,
            });
        }

        let rows = data.len() / row_size;
        let mut x = Vec::with_capacity(rows * x_size);
        let mut y = Vec::with_capacity(rows);

        for row in data.chunks_exact(row_size) {
            let (features, target) = row.split_at(x_size);
            x.extend_from_slice(features);
            y.push(target[0]);
        }

        let x = Array2::from_shape_vec((rows, x_size), x).map_err(|_| MlErr::SizeMismatch {
            what: "feature matrix",
            got: rows * x_size,
            expected: rows * x_size,
        })?;

        Self::new(x, Array1::from_vec(y))
    }

    /// Returns the amount of samples in the dataset.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns `true` if the dataset holds no samples.
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Returns the amount of features per sample.
    pub fn width(&self) -> usize {
        self.x.ncols()
    }

    /// A view of the feature matrix.
    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    /// A view of the targets.
    pub fn y(&self) -> ArrayView1<'_, f32> {
        self.y.view()
    }

    /// Builds a new dataset out of the given rows, in the given order.
    ///
    /// # Arguments
    /// * `indices` - The rows to take, may contain repetitions.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Splits the dataset in a train and a test partition after shuffling it with a seeded rng.
    ///
    /// The test partition gets `ceil(len * test_ratio)` samples, never all nor none of them.
    ///
    /// # Arguments
    /// * `test_ratio` - The fraction of samples used for testing, in `(0, 1)`.
    /// * `seed` - The seed of the shuffle.
    ///
    /// # Returns
    /// The `(train, test)` partitions or an error if the split isn't possible.
    pub fn train_test_split(&self, test_ratio: f32, seed: u64) -> Result<(Self, Self)> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(MlErr::InvalidHyperParam {
                name: "test_ratio",
                reason: format!("must be in (0, 1), got {test_ratio}"),
            });
        }

        let len = self.len();
        if len < 2 {
            return Err(MlErr::SizeMismatch {
                what: "samples to split",
                got: len,
                expected: 2,
            });
        }

        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let test_len = ((len as f32 * test_ratio).ceil() as usize).clamp(1, len - 1);
        let (test, train) = indices.split_at(test_len);

        Ok((self.select(train), self.select(test)))
    }
}
