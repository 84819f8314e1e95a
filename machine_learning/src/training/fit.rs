use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    dataset::Dataset,
    estimators::{Algorithm, Estimator, ForestParams, LinearRegression, RandomForest, Regressor},
    metrics::EvalMetrics,
    scaling::{FeatureScaler, IdentityScaler, Scaler, StandardScaler},
};

/// The estimator to fit and its hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AlgorithmParams {
    RandomForest(ForestParams),
    LinearRegression,
}

impl AlgorithmParams {
    /// Returns the tag of the estimator these parameters fit.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            AlgorithmParams::RandomForest(_) => Algorithm::RandomForest,
            AlgorithmParams::LinearRegression => Algorithm::LinearRegression,
        }
    }
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self::RandomForest(ForestParams::default())
    }
}

/// Everything `fit` needs besides the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub params: AlgorithmParams,
    pub test_ratio: f32,
    pub split_seed: u64,
    pub standardize: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            params: AlgorithmParams::default(),
            test_ratio: 0.2,
            split_seed: 42,
            standardize: true,
        }
    }
}

/// An estimator and the scaler it was fitted together with, plus its held-out metrics.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub scaler: FeatureScaler,
    pub regressor: Regressor,
    pub metrics: EvalMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Fits a scaler and an estimator over `dataset` and evaluates them on a held-out split.
///
/// The scaler is fitted on the train split only, both splits are transformed with it and the
/// estimator is fitted over the transformed train split.
///
/// # Arguments
/// * `dataset` - The full dataset.
/// * `options` - The algorithm, its hyper-parameters and the split settings.
///
/// # Returns
/// The fitted model or an error if the data can't be split or fitted.
pub fn fit(dataset: &Dataset, options: &FitOptions) -> Result<FittedModel> {
    let (train, test) = dataset.train_test_split(options.test_ratio, options.split_seed)?;

    let scaler: FeatureScaler = if options.standardize {
        StandardScaler::fit(train.x())?.into()
    } else {
        IdentityScaler::new(train.width()).into()
    };

    let x_train = scaler.transform_matrix(train.x())?;
    let x_test = scaler.transform_matrix(test.x())?;

    let regressor: Regressor = match options.params {
        AlgorithmParams::RandomForest(params) => {
            RandomForest::fit(x_train.view(), train.y(), params)?.into()
        }
        AlgorithmParams::LinearRegression => {
            LinearRegression::fit(x_train.view(), train.y())?.into()
        }
    };

    let y_pred = regressor.predict_matrix(x_test.view())?;
    let metrics = EvalMetrics::evaluate(test.y(), y_pred.view())?;

    info!(
        algorithm = regressor.algorithm().as_str(),
        rmse = metrics.rmse,
        mae = metrics.mae,
        r2 = metrics.r2;
        "model fitted"
    );

    Ok(FittedModel {
        scaler,
        regressor,
        metrics,
        train_rows: train.len(),
        test_rows: test.len(),
    })
}
