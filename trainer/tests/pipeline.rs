use std::fs;

use artifact::{FsStore, Registry, VersionSelector};
use machine_learning::{
    estimators::{Algorithm, Estimator},
    scaling::Scaler,
    training::{AlgorithmParams, FitOptions},
};
use serde_json::json;
use trainer::{
    TrainerErr,
    configs::{DatasetConfig, TrainingConfig},
    train,
};

fn config(dir: &std::path::Path, dataset: DatasetConfig) -> TrainingConfig {
    TrainingConfig {
        artifact_dir: dir.join("artifacts"),
        dataset,
        ..Default::default()
    }
}

#[test]
fn test_synthetic_run_publishes_a_loadable_forest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), DatasetConfig::Synthetic { rows: 400, seed: 3 });
    if let AlgorithmParams::RandomForest(params) = &mut config.fit.params {
        params.n_estimators = 10;
    }

    let report = train(&config).unwrap();
    assert_eq!(report.algorithm, "random_forest");
    assert_eq!(report.train_rows + report.test_rows, 400);
    assert_eq!(report.imputed, 0);
    assert_eq!(
        report.feature_names,
        ["startYear", "runtimeMinutes", "numVotes"]
    );

    let registry = Registry::new(FsStore::new(&config.artifact_dir));
    let artifact = registry.load(&VersionSelector::Latest).unwrap();
    assert_eq!(artifact.version(), &report.version);
    assert_eq!(artifact.algorithm(), Algorithm::RandomForest);
    assert_eq!(artifact.metadata().metrics, report.metrics);

    let request = json!({"startYear": 2005, "runtimeMinutes": 105, "numVotes": 5000});
    let input = artifact.contract().validate_value(&request).unwrap();
    let scaled = artifact.scaler().transform(&input.values).unwrap();
    let rating = artifact.regressor().predict(&scaled).unwrap();
    assert!((1.0..=10.0).contains(&rating), "{rating}");
}

#[test]
fn test_runs_publish_increasing_versions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), DatasetConfig::Synthetic { rows: 100, seed: 1 });
    config.fit = FitOptions {
        params: AlgorithmParams::LinearRegression,
        ..Default::default()
    };

    let first = train(&config).unwrap().version;
    let second = train(&config).unwrap().version;
    assert!(second > first);

    let registry = Registry::new(FsStore::new(&config.artifact_dir));
    assert_eq!(registry.list_versions().unwrap(), [first, second.clone()]);
    assert_eq!(registry.latest_version().unwrap(), Some(second));
}

#[test]
fn test_local_rows_with_gaps_are_imputed_into_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("titles.jsonl");
    let rows: Vec<String> = (0..40)
        .map(|i| {
            let mut row = json!({
                "startYear": 1980 + i,
                "runtimeMinutes": 90 + i,
                "numVotes": 1000 * (i + 1),
                "averageRating": 5.0 + i as f64 * 0.05,
            });
            if i % 10 == 0 {
                row["runtimeMinutes"] = json!(null);
            }
            row.to_string()
        })
        .collect();
    fs::write(&path, rows.join("\n")).unwrap();

    let mut config = config(dir.path(), DatasetConfig::Local { path });
    config.fit.params = AlgorithmParams::LinearRegression;

    let report = train(&config).unwrap();
    assert_eq!(report.imputed, 4);

    let registry = Registry::new(FsStore::new(&config.artifact_dir));
    let artifact = registry.load(&VersionSelector::Pinned(report.version)).unwrap();
    let runtime = artifact.contract().feature("runtimeMinutes").unwrap();
    assert!(runtime.default.is_some());

    let input = artifact
        .contract()
        .validate_value(&json!({"startYear": 2000, "numVotes": 20000}))
        .unwrap();
    assert_eq!(input.filled, ["runtimeMinutes"]);
}

#[test]
fn test_bad_rows_publish_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("titles.jsonl");
    fs::write(
        &path,
        "{\"startYear\": 1999, \"runtimeMinutes\": 100, \"numVotes\": 10, \"averageRating\": 7}\n\
         {\"startYear\": 2001, \"runtimeMinutes\": 90, \"numVotes\": 12}\n",
    )
    .unwrap();

    let config = config(dir.path(), DatasetConfig::Local { path });
    let err = train(&config).unwrap_err();

    assert!(matches!(err, TrainerErr::InvalidRow { row: 2, .. }));
    assert!(!config.artifact_dir.exists());
}

#[test]
fn test_invalid_config_is_rejected_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(
        dir.path(),
        DatasetConfig::Local {
            path: dir.path().join("missing.jsonl"),
        },
    );
    config.fit.test_ratio = 1.5;

    assert!(matches!(train(&config), Err(TrainerErr::InvalidConfig(_))));
}
