use chrono::{DateTime, Utc};
use machine_learning::{
    estimators::{Algorithm, Estimator, Regressor},
    metrics::EvalMetrics,
    scaling::{FeatureScaler, Scaler},
};
use serde::{Deserialize, Serialize};

use crate::{
    contract::FeatureContract,
    error::{ArtifactErr, Result},
    version::VersionId,
};

/// What a training run records about the model it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trained_at: DateTime<Utc>,
    pub algorithm: Algorithm,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: EvalMetrics,
    /// The column names the model was fitted on, in order.
    pub feature_names: Vec<String>,
}

/// The outcome of a training run, handed to `Registry::save`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    pub metrics: EvalMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// A versioned bundle of a fitted estimator, the scaler it was fitted with, its feature contract
/// and metadata. Never mutated once published.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub(crate) version: VersionId,
    contract: FeatureContract,
    scaler: FeatureScaler,
    regressor: Regressor,
    metadata: ArtifactMetadata,
}

impl ModelArtifact {
    /// Bundles the given parts, consistency is checked by `validate_integrity`.
    pub fn new(
        version: VersionId,
        contract: FeatureContract,
        scaler: FeatureScaler,
        regressor: Regressor,
        metadata: ArtifactMetadata,
    ) -> Self {
        Self {
            version,
            contract,
            scaler,
            regressor,
            metadata,
        }
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn algorithm(&self) -> Algorithm {
        self.regressor.algorithm()
    }
}

/// Checks that the parts of an artifact were made for each other.
///
/// # Arguments
/// * `artifact` - The artifact to check.
///
/// # Returns
/// A corruption error if the scaler's width differs from the contract's length, the estimator's
/// input width differs from the scaler's, or the recorded feature names or algorithm don't match.
pub fn validate_integrity(artifact: &ModelArtifact) -> Result<()> {
    check_shapes(
        &artifact.version,
        &artifact.contract,
        artifact.scaler.width(),
        artifact.regressor.input_width(),
        &artifact.metadata,
    )?;

    if artifact.metadata.algorithm != artifact.regressor.algorithm() {
        return Err(ArtifactErr::corruption(
            &artifact.version,
            format!(
                "metadata says {} but the estimator is a {}",
                artifact.metadata.algorithm,
                artifact.regressor.algorithm()
            ),
        ));
    }

    Ok(())
}

pub(crate) fn check_shapes(
    version: &VersionId,
    contract: &FeatureContract,
    scaler_width: usize,
    estimator_width: usize,
    metadata: &ArtifactMetadata,
) -> Result<()> {
    if scaler_width != contract.len() {
        return Err(ArtifactErr::corruption(
            version,
            format!(
                "the scaler expects {scaler_width} features but the contract declares {}",
                contract.len()
            ),
        ));
    }

    if estimator_width != scaler_width {
        return Err(ArtifactErr::corruption(
            version,
            format!(
                "the estimator expects {estimator_width} features but the scaler outputs \
                 {scaler_width}"
            ),
        ));
    }

    if !contract.names().eq(metadata.feature_names.iter().map(String::as_str)) {
        return Err(ArtifactErr::corruption(
            version,
            format!(
                "recorded feature names {:?} don't match the contract {:?}",
                metadata.feature_names,
                contract.names().collect::<Vec<_>>()
            ),
        ));
    }

    Ok(())
}
