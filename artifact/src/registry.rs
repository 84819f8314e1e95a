use chrono::Utc;
use log::{info, warn};
use machine_learning::{estimators::Regressor, scaling::FeatureScaler, training::FittedModel};

use crate::{
    bundle::{self, ArtifactMetadata, ModelArtifact, TrainingSummary},
    codec::{self, ArtifactHeader},
    contract::FeatureContract,
    error::{ArtifactErr, Result},
    store::ArtifactStore,
    version::{VersionClock, VersionId, VersionSelector},
};

const SAVE_ATTEMPTS: usize = 4;

/// Versioned persistence of model artifacts over an `ArtifactStore`.
pub struct Registry<S> {
    store: S,
    clock: &'static VersionClock,
}

impl<S: ArtifactStore> Registry<S> {
    /// Creates a registry issuing versions from the process wide clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: VersionClock::global(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bundles and persists a freshly fitted model under a new version.
    ///
    /// The new version sorts after every version already in the store and every version this
    /// process issued before. If another writer takes the same id first, a new one is issued.
    ///
    /// # Arguments
    /// * `regressor` - The fitted estimator.
    /// * `scaler` - The scaler the estimator was fitted with.
    /// * `contract` - The features the model consumes, in column order.
    /// * `summary` - The training run's metrics and sizes.
    ///
    /// # Returns
    /// The new version, or a corruption error if the parts don't fit together, or any store error.
    pub fn save(
        &self,
        regressor: Regressor,
        scaler: FeatureScaler,
        contract: FeatureContract,
        summary: TrainingSummary,
    ) -> Result<VersionId> {
        let metadata = ArtifactMetadata {
            trained_at: Utc::now(),
            algorithm: regressor.algorithm(),
            train_rows: summary.train_rows,
            test_rows: summary.test_rows,
            metrics: summary.metrics,
            feature_names: contract.names().map(String::from).collect(),
        };

        let version = self.clock.next(self.latest_version()?.as_ref());
        let mut artifact = ModelArtifact::new(version, contract, scaler, regressor, metadata);
        bundle::validate_integrity(&artifact)?;

        for attempt in 1..=SAVE_ATTEMPTS {
            let bytes = codec::encode(&artifact)?;

            match self.store.put(artifact.version(), &bytes) {
                Ok(()) => {
                    info!(
                        version = artifact.version().as_str(),
                        algorithm = artifact.algorithm().as_str(),
                        bytes = bytes.len();
                        "artifact saved"
                    );
                    return Ok(artifact.version);
                }
                Err(ArtifactErr::AlreadyExists(taken)) if attempt < SAVE_ATTEMPTS => {
                    warn!("version {taken} is taken, retrying with a new one");
                    artifact.version = self.clock.next(self.latest_version()?.as_ref());
                }
                Err(e) => return Err(e),
            }
        }

        Err(ArtifactErr::AlreadyExists(artifact.version))
    }

    /// Same as `save` for the output of `machine_learning::training::fit`.
    pub fn save_fitted(&self, fitted: FittedModel, contract: FeatureContract) -> Result<VersionId> {
        let summary = TrainingSummary {
            metrics: fitted.metrics,
            train_rows: fitted.train_rows,
            test_rows: fitted.test_rows,
        };
        self.save(fitted.regressor, fitted.scaler, contract, summary)
    }

    /// Loads and fully checks an artifact.
    ///
    /// `Latest` is resolved against the store on every call.
    ///
    /// # Returns
    /// The artifact, `NotFound` if the store is empty or the pinned version doesn't exist, or
    /// `Corruption` if it exists but is unusable.
    pub fn load(&self, selector: &VersionSelector) -> Result<ModelArtifact> {
        let version = self.resolve(selector)?;
        let bytes = self.store.get(&version)?;
        codec::decode(&version, &bytes)
    }

    /// Loads and checks only the header of an artifact.
    pub fn load_header(&self, selector: &VersionSelector) -> Result<ArtifactHeader> {
        let version = self.resolve(selector)?;
        let bytes = self.store.get(&version)?;
        codec::read_header(&version, &bytes)
    }

    /// Turns a selector into a concrete version.
    pub fn resolve(&self, selector: &VersionSelector) -> Result<VersionId> {
        match selector {
            VersionSelector::Latest => self
                .latest_version()?
                .ok_or(ArtifactErr::NotFound { version: None }),
            VersionSelector::Pinned(version) => Ok(version.clone()),
        }
    }

    /// Every stored version, oldest first.
    pub fn list_versions(&self) -> Result<Vec<VersionId>> {
        let mut versions = self.store.list_versions()?;
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<VersionId>> {
        Ok(self.store.list_versions()?.into_iter().max())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use machine_learning::{
        estimators::{Estimator, LinearRegression},
        metrics::EvalMetrics,
        scaling::{IdentityScaler, Scaler, StandardScaler},
    };

    use super::*;
    use crate::{contract::FeatureSpec, store::MemoryStore};

    fn contract() -> FeatureContract {
        FeatureContract::define(vec![
            FeatureSpec::continuous("a").with_default(0.0),
            FeatureSpec::continuous("b").with_default(0.0),
        ])
        .unwrap()
    }

    fn summary() -> TrainingSummary {
        TrainingSummary {
            metrics: EvalMetrics {
                rmse: 0.3,
                mae: 0.2,
                r2: 0.8,
            },
            train_rows: 80,
            test_rows: 20,
        }
    }

    fn linear(intercept: f32) -> Regressor {
        LinearRegression::from_parts(vec![2.0, -1.0], intercept).into()
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let registry = Registry::new(MemoryStore::new());

        assert!(matches!(
            registry.load(&VersionSelector::Latest),
            Err(ArtifactErr::NotFound { version: None })
        ));
    }

    #[test]
    fn test_saved_artifact_predicts_the_same_after_load() {
        let registry = Registry::new(MemoryStore::new());
        let scaler = StandardScaler::from_parts(vec![10.0, 20.0], vec![2.0, 5.0]).unwrap();
        let regressor = linear(1.5);

        let version = registry
            .save(regressor.clone(), scaler.clone().into(), contract(), summary())
            .unwrap();
        let loaded = registry.load(&VersionSelector::Pinned(version.clone())).unwrap();

        assert_eq!(loaded.version(), &version);
        assert_eq!(loaded.contract(), &contract());
        for probe in [[10.0, 20.0], [0.0, 0.0], [15.5, -3.0]] {
            let expected = regressor.predict(&scaler.transform(&probe).unwrap()).unwrap();
            let scaled = loaded.scaler().transform(&probe).unwrap();
            assert_eq!(loaded.regressor().predict(&scaled).unwrap(), expected);
        }
    }

    #[test]
    fn test_latest_follows_creation_order() {
        let registry = Registry::new(Arc::new(MemoryStore::new()));

        let saved: Vec<_> = (0..5)
            .map(|i| {
                registry
                    .save(linear(i as f32), IdentityScaler::new(2).into(), contract(), summary())
                    .unwrap()
            })
            .collect();

        assert_eq!(registry.list_versions().unwrap(), saved);

        let latest = registry.load(&VersionSelector::Latest).unwrap();
        assert_eq!(latest.version(), &saved[4]);
        assert_eq!(latest.regressor(), &linear(4.0));
    }

    #[test]
    fn test_save_rejects_inconsistent_bundles() {
        let registry = Registry::new(MemoryStore::new());
        let regressor = LinearRegression::from_parts(vec![1.0; 3], 0.0).into();

        let err = registry
            .save(regressor, IdentityScaler::new(2).into(), contract(), summary())
            .unwrap_err();

        assert!(matches!(err, ArtifactErr::Corruption { .. }));
        assert!(registry.list_versions().unwrap().is_empty());
    }

    #[test]
    fn test_pinned_missing_version() {
        let registry = Registry::new(MemoryStore::new());
        let version = VersionClock::new().next(None);

        assert!(matches!(
            registry.load(&VersionSelector::Pinned(version)),
            Err(ArtifactErr::NotFound { version: Some(_) })
        ));
    }

    #[test]
    fn test_header_without_body() {
        let registry = Registry::new(MemoryStore::new());
        registry
            .save(linear(0.0), IdentityScaler::new(2).into(), contract(), summary())
            .unwrap();

        let header = registry.load_header(&VersionSelector::Latest).unwrap();
        assert_eq!(header.metadata.feature_names, ["a", "b"]);
        assert_eq!(header.metadata.train_rows, 80);
    }
}
