use artifact::{FsStore, Registry, VersionId};
use log::info;
use machine_learning::{metrics::EvalMetrics, training};
use serde::Serialize;

use crate::{
    configs::{DatasetConfig, TrainingConfig},
    data,
    error::Result,
    synthetic,
};

/// What a training run published.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: VersionId,
    pub algorithm: &'static str,
    pub metrics: EvalMetrics,
    pub feature_names: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Feature values that were missing and got imputed.
    pub imputed: usize,
}

/// Loads the rows, fits the model and publishes it as a new artifact version under
/// `config.artifact_dir`.
///
/// # Errors
/// Returns a `TrainerErr` if the configuration is invalid, a row can't be used, the fit fails or
/// the artifact can't be written.
pub fn train(config: &TrainingConfig) -> Result<TrainingReport> {
    config.validate()?;

    let rows = match &config.dataset {
        DatasetConfig::Local { path } => data::load_json_lines(path)?,
        DatasetConfig::Synthetic { rows, seed } => synthetic::generate(*rows, *seed)?,
    };

    let prepared = data::prepare(&rows, &config.features, &config.target)?;
    info!(
        "fitting {} on {} rows",
        config.fit.params.algorithm().as_str(),
        prepared.dataset.len()
    );

    let fitted = training::fit(&prepared.dataset, &config.fit)?;
    let metrics = fitted.metrics;
    let (train_rows, test_rows) = (fitted.train_rows, fitted.test_rows);
    let algorithm = fitted.regressor.algorithm().as_str();
    let feature_names = prepared.contract.names().map(String::from).collect();

    let registry = Registry::new(FsStore::new(&config.artifact_dir));
    let version = registry.save_fitted(fitted, prepared.contract)?;

    info!(
        version = version.as_str(), rmse = metrics.rmse, mae = metrics.mae, r2 = metrics.r2;
        "model published"
    );

    Ok(TrainingReport {
        version,
        algorithm,
        metrics,
        feature_names,
        train_rows,
        test_rows,
        imputed: prepared.imputed,
    })
}
