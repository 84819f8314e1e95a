#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use artifact::{
    ArtifactMetadata, ArtifactStore, FeatureContract, FeatureSpec, MemoryStore, ModelArtifact,
    Registry, TrainingSummary, VersionClock, VersionId, codec,
};
use chrono::Utc;
use machine_learning::{
    dataset::Dataset,
    estimators::{Algorithm, ForestParams, LinearRegression, Regressor, TreeParams},
    metrics::EvalMetrics,
    scaling::IdentityScaler,
    training::{AlgorithmParams, FitOptions, fit},
};
use ndarray::{Array1, Array2};
use serde_json::{Map, Value};
use serving::{Gateway, MemorySink, ServingConfig};

pub fn imdb_contract() -> FeatureContract {
    FeatureContract::define(vec![
        FeatureSpec::discrete("startYear")
            .with_range(Some(1900.0), Some(2030.0))
            .with_default(2005.0),
        FeatureSpec::discrete("runtimeMinutes")
            .with_range(Some(1.0), Some(600.0))
            .with_default(105.0),
        FeatureSpec::discrete("numVotes")
            .with_range(Some(0.0), None)
            .with_default(5000.0),
    ])
    .unwrap()
}

pub fn summary() -> TrainingSummary {
    TrainingSummary {
        metrics: EvalMetrics {
            rmse: 0.4,
            mae: 0.3,
            r2: 0.7,
        },
        train_rows: 80,
        test_rows: 20,
    }
}

/// `rating = 5 + votes / 100_000`, over raw features.
pub fn save_linear(registry: &Registry<Arc<MemoryStore>>) -> VersionId {
    save_linear_with(registry, 1e-5, 5.0, 5000.0)
}

/// `rating = intercept + votes * per_vote`, over raw features, filling missing votes with
/// `default_votes`.
pub fn save_linear_with(
    registry: &Registry<Arc<MemoryStore>>,
    per_vote: f32,
    intercept: f32,
    default_votes: f64,
) -> VersionId {
    let contract = FeatureContract::define(vec![
        FeatureSpec::discrete("startYear")
            .with_range(Some(1900.0), Some(2030.0))
            .with_default(2005.0),
        FeatureSpec::discrete("runtimeMinutes")
            .with_range(Some(1.0), Some(600.0))
            .with_default(105.0),
        FeatureSpec::discrete("numVotes")
            .with_range(Some(0.0), None)
            .with_default(default_votes),
    ])
    .unwrap();

    let regressor = LinearRegression::from_parts(vec![0.0, 0.0, per_vote], intercept).into();
    registry
        .save(regressor, IdentityScaler::new(3).into(), contract, summary())
        .unwrap()
}

pub fn save_forest(registry: &Registry<Arc<MemoryStore>>) -> VersionId {
    let x = Array2::from_shape_fn((200, 3), |(i, j)| match j {
        0 => 1970.0 + (i % 55) as f32,
        1 => 80.0 + (i * 13 % 100) as f32,
        _ => 100.0 + (i * 9973 % 200_000) as f32,
    });
    let y = Array1::from_shape_fn(200, |i| 5.0 + (i % 55) as f32 * 0.05);
    let options = FitOptions {
        params: AlgorithmParams::RandomForest(ForestParams {
            n_estimators: 10,
            tree: TreeParams {
                max_depth: 6,
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let fitted = fit(&Dataset::new(x, y).unwrap(), &options).unwrap();
    registry.save_fitted(fitted, imdb_contract()).unwrap()
}

/// Writes an artifact whose contract declares 3 features but whose estimator expects 4,
/// bypassing the registry's checks.
pub fn put_corrupt(store: &MemoryStore) -> VersionId {
    let latest = store.list_versions().unwrap().into_iter().max();
    let version = VersionClock::global().next(latest.as_ref());
    let contract = imdb_contract();

    let artifact = ModelArtifact::new(
        version.clone(),
        contract.clone(),
        IdentityScaler::new(3).into(),
        Regressor::from(LinearRegression::from_parts(vec![1.0; 4], 0.0)),
        ArtifactMetadata {
            trained_at: Utc::now(),
            algorithm: Algorithm::LinearRegression,
            train_rows: 1,
            test_rows: 1,
            metrics: summary().metrics,
            feature_names: contract.names().map(String::from).collect(),
        },
    );

    store.put(&version, &codec::encode(&artifact).unwrap()).unwrap();
    version
}

pub fn config() -> ServingConfig {
    ServingConfig {
        load_attempts: std::num::NonZeroUsize::MIN,
        load_backoff: Duration::from_millis(1),
        predict_timeout: Duration::from_secs(5),
        refresh_interval: None,
        ..Default::default()
    }
}

pub fn gateway(
    store: &Arc<MemoryStore>,
    config: ServingConfig,
) -> (Gateway<Arc<MemoryStore>>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let gateway = Gateway::with_telemetry(Registry::new(Arc::clone(store)), config, sink.clone());
    (gateway, sink)
}

pub fn request(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("{other} is not an object"),
    }
}
