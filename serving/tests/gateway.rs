mod common;

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use artifact::{
    ArtifactStore, MemoryStore, Registry, Result as ArtifactResult, VersionId, VersionSelector,
};
use serde_json::json;
use serving::{
    ConfidenceBand, Gateway, GatewayState, HealthStatus, MemorySink, RefreshOutcome,
    ServingConfig, ServingErr, telemetry::events,
};

use common::{
    config, gateway, put_corrupt, request, save_forest, save_linear, save_linear_with,
};

#[tokio::test]
async fn test_imdb_scenario() {
    let store = Arc::new(MemoryStore::new());
    let version = save_linear(&Registry::new(Arc::clone(&store)));
    let (gateway, sink) = gateway(&store, config());

    assert_eq!(gateway.initialize().await.unwrap(), version);

    let blockbuster = json!({"startYear": 2010, "runtimeMinutes": 148, "numVotes": 2000000});
    let result = gateway.predict(blockbuster).await.unwrap();
    assert!((result.raw_prediction - 25.0).abs() < 1e-3);
    assert_eq!(result.predicted_rating, 10.0);
    assert_eq!(result.model_version, version);
    assert!(result.out_of_range.is_empty());

    let silent = json!({"startYear": 1850, "runtimeMinutes": 148, "numVotes": 100});
    let result = gateway.predict(silent).await.unwrap();
    assert!((1.0..=10.0).contains(&result.predicted_rating));
    assert_eq!(result.out_of_range, ["startYear"]);

    let err = gateway
        .predict(json!({"runtimeMinutes": "one-forty-eight"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ServingErr::TypeCoercion { .. }));
    assert_eq!(err.field(), Some("runtimeMinutes"));
    assert!(err.is_client_error());

    assert_eq!(sink.named(events::PREDICT_OK).len(), 2);
    assert_eq!(sink.named(events::PREDICT_OUT_OF_RANGE).len(), 1);
    assert_eq!(sink.named(events::PREDICT_ERROR)[0]["field"], "runtimeMinutes");
}

#[tokio::test]
async fn test_uninitialized_gateway_refuses_predictions() {
    let store = Arc::new(MemoryStore::new());
    let (gateway, _) = gateway(&store, config());

    assert!(matches!(gateway.state(), GatewayState::Uninitialized));
    let err = gateway.predict(json!({})).await.unwrap_err();
    assert!(matches!(err, ServingErr::ModelUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_empty_store_degrades_until_an_artifact_shows_up() {
    let store = Arc::new(MemoryStore::new());
    let (gateway, _) = gateway(&store, config());

    let err = gateway.initialize().await.unwrap_err();
    assert!(matches!(err, ServingErr::ArtifactNotFound(None)));
    assert!(matches!(gateway.state(), GatewayState::Degraded(_)));

    let health = gateway.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.reason.is_some());
    assert!(matches!(
        gateway.predict(json!({"startYear": 2000})).await,
        Err(ServingErr::ModelUnavailable(_))
    ));

    let version = save_linear(&Registry::new(Arc::clone(&store)));
    let outcome = gateway.refresh().await.unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Swapped {
            previous: None,
            version: version.clone(),
        }
    );
    assert_eq!(gateway.health().status, HealthStatus::Healthy);
    assert_eq!(gateway.health().active_model_version, Some(version));
}

#[tokio::test]
async fn test_initialize_retries_until_attempts_run_out() {
    let store = Arc::new(MemoryStore::new());
    let config = ServingConfig {
        load_attempts: NonZeroUsize::new(3).unwrap(),
        ..config()
    };
    let (gateway, sink) = gateway(&store, config);

    assert!(gateway.initialize().await.is_err());
    assert_eq!(sink.named(events::REFRESH_FAILED).len(), 3);
}

#[tokio::test]
async fn test_refresh_adopts_newer_versions_and_skips_unchanged_ones() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(Arc::clone(&store));
    let first = save_linear(&registry);
    let (gateway, sink) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    assert_eq!(
        gateway.refresh().await.unwrap(),
        RefreshOutcome::Unchanged {
            version: first.clone(),
        }
    );

    let second = save_forest(&registry);
    assert!(second > first);
    assert_eq!(
        gateway.refresh().await.unwrap(),
        RefreshOutcome::Swapped {
            previous: Some(first),
            version: second.clone(),
        }
    );

    let result = gateway
        .predict(json!({"startYear": 2000, "runtimeMinutes": 100, "numVotes": 500}))
        .await
        .unwrap();
    assert_eq!(result.model_version, second);
    assert_eq!(sink.named(events::MODEL_LOADED).len(), 2);
}

#[tokio::test]
async fn test_corrupt_artifact_keeps_the_active_version() {
    let store = Arc::new(MemoryStore::new());
    let good = save_linear(&Registry::new(Arc::clone(&store)));
    let (gateway, sink) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let bad = put_corrupt(&store);
    assert!(bad > good);

    let err = gateway.refresh().await.unwrap_err();
    assert!(matches!(err, ServingErr::Corruption { .. }));
    assert!(!err.is_retryable());
    assert_eq!(gateway.active_version(), Some(good.clone()));
    assert_eq!(gateway.health().status, HealthStatus::Healthy);

    let corrupt = sink.named(events::ARTIFACT_CORRUPT);
    assert_eq!(corrupt.len(), 1);
    assert_eq!(corrupt[0]["version"], bad.as_str());

    let result = gateway
        .predict(json!({"startYear": 2000, "runtimeMinutes": 100, "numVotes": 500}))
        .await
        .unwrap();
    assert_eq!(result.model_version, good);
}

#[tokio::test]
async fn test_corrupt_first_artifact_degrades_without_retrying() {
    let store = Arc::new(MemoryStore::new());
    put_corrupt(&store);
    let config = ServingConfig {
        load_attempts: NonZeroUsize::new(5).unwrap(),
        ..config()
    };
    let (gateway, sink) = gateway(&store, config);

    assert!(matches!(
        gateway.initialize().await,
        Err(ServingErr::Corruption { .. })
    ));
    assert!(matches!(gateway.state(), GatewayState::Degraded(_)));
    assert_eq!(sink.named(events::REFRESH_FAILED).len(), 1);
}

#[tokio::test]
async fn test_pinned_version_ignores_newer_artifacts() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(Arc::clone(&store));
    let pinned = save_linear(&registry);
    save_forest(&registry);

    let config = ServingConfig {
        model_version: VersionSelector::Pinned(pinned.clone()),
        ..config()
    };
    let (gateway, _) = gateway(&store, config);

    assert_eq!(gateway.initialize().await.unwrap(), pinned);
    assert!(matches!(
        gateway.refresh().await.unwrap(),
        RefreshOutcome::Unchanged { .. }
    ));
    assert_eq!(gateway.model_info().unwrap().algorithm.as_str(), "linear_regression");
}

#[tokio::test]
async fn test_partial_batch_failure_keeps_order() {
    let store = Arc::new(MemoryStore::new());
    save_forest(&Registry::new(Arc::clone(&store)));
    let (gateway, _) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let requests = vec![
        json!({"startYear": 1999, "runtimeMinutes": 120, "numVotes": 1000}),
        json!({"startYear": 2005, "runtimeMinutes": 95, "numVotes": 50}),
        json!({"startYear": 2010, "runtimeMinutes": "abc", "numVotes": 10}),
        json!({"startYear": 1980, "runtimeMinutes": 140, "numVotes": 90000}),
        json!({"startYear": 2020, "runtimeMinutes": 88, "numVotes": 7}),
    ];

    let mut singles = Vec::new();
    for request in &requests {
        singles.push(gateway.predict(request.clone()).await);
    }

    let results = gateway.predict_batch(requests).await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    assert!(matches!(
        &results[2],
        Err(ServingErr::TypeCoercion { field, .. }) if field == "runtimeMinutes"
    ));
    assert_eq!(results, singles);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_whole() {
    let store = Arc::new(MemoryStore::new());
    save_linear(&Registry::new(Arc::clone(&store)));
    let config = ServingConfig {
        max_batch: 2,
        ..config()
    };
    let (gateway, _) = gateway(&store, config);
    gateway.initialize().await.unwrap();

    let err = gateway
        .predict_batch(vec![json!({}), json!({}), json!({})])
        .await
        .unwrap_err();
    assert!(matches!(err, ServingErr::Schema { field: None, .. }));
    assert!(gateway.predict_batch(Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_predict_is_idempotent_and_order_insensitive() {
    let store = Arc::new(MemoryStore::new());
    save_forest(&Registry::new(Arc::clone(&store)));
    let (gateway, _) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let a = request(json!({"startYear": 1994, "runtimeMinutes": 142, "numVotes": 2500000}));
    let b = request(json!({"numVotes": 2500000, "runtimeMinutes": 142, "startYear": 1994}));

    let first = gateway.predict(a.clone()).await.unwrap();
    assert_eq!(gateway.predict(a).await.unwrap(), first);
    assert_eq!(gateway.predict(b).await.unwrap(), first);
    assert!(first.confidence.score > 0.0 && first.confidence.score <= 1.0);
}

#[tokio::test]
async fn test_linear_models_use_the_fixed_confidence_heuristic() {
    let store = Arc::new(MemoryStore::new());
    save_linear(&Registry::new(Arc::clone(&store)));
    let (gateway, _) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let result = gateway
        .predict(json!({"startYear": 2000, "runtimeMinutes": 100, "numVotes": 250000}))
        .await
        .unwrap();
    assert!((result.predicted_rating - 7.5).abs() < 1e-4);
    assert_eq!(result.confidence.band, ConfidenceBand::Medium);
    assert!((result.confidence.score - 0.75).abs() < 1e-4);
}

#[tokio::test]
async fn test_missing_features_are_filled_and_reported() {
    let store = Arc::new(MemoryStore::new());
    save_linear(&Registry::new(Arc::clone(&store)));
    let (gateway, _) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let result = gateway
        .predict(json!({"startYear": 2000, "primaryTitle": "Heat"}))
        .await
        .unwrap();
    assert_eq!(result.filled, ["runtimeMinutes", "numVotes"]);
    assert_eq!(result.ignored, ["primaryTitle"]);
    assert!((result.raw_prediction - 5.05).abs() < 1e-4);
}

/// A store whose reads can be slowed down at will.
#[derive(Clone)]
struct SlowStore {
    inner: Arc<MemoryStore>,
    delay_ms: Arc<AtomicU64>,
}

impl SlowStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl ArtifactStore for SlowStore {
    fn put(&self, version: &VersionId, bytes: &[u8]) -> ArtifactResult<()> {
        self.inner.put(version, bytes)
    }

    fn get(&self, version: &VersionId) -> ArtifactResult<Vec<u8>> {
        std::thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
        self.inner.get(version)
    }

    fn list_versions(&self) -> ArtifactResult<Vec<VersionId>> {
        self.inner.list_versions()
    }
}

#[tokio::test]
async fn test_slow_first_load_times_out_into_degraded() {
    let store = Arc::new(MemoryStore::new());
    save_linear(&Registry::new(Arc::clone(&store)));

    let slow = SlowStore::new(store);
    slow.set_delay(Duration::from_millis(300));
    let config = ServingConfig {
        load_timeout: Duration::from_millis(20),
        ..config()
    };
    let gateway = Gateway::new(Registry::new(slow), config);

    let err = gateway.initialize().await.unwrap_err();
    assert!(matches!(err, ServingErr::Timeout { operation: "load", .. }));
    assert!(gateway.active_version().is_none());
    assert!(matches!(gateway.state(), GatewayState::Degraded(_)));
}

#[tokio::test]
async fn test_refresh_past_its_budget_keeps_the_active_artifact() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(Arc::clone(&store));
    let first = save_linear(&registry);

    let slow = SlowStore::new(Arc::clone(&store));
    let config = ServingConfig {
        load_timeout: Duration::from_millis(100),
        ..config()
    };
    let sink = Arc::new(MemorySink::new());
    let gateway = Gateway::with_telemetry(Registry::new(slow.clone()), config, sink.clone());
    gateway.initialize().await.unwrap();

    let second = save_forest(&registry);
    slow.set_delay(Duration::from_millis(500));

    let err = gateway.refresh().await.unwrap_err();
    assert!(matches!(err, ServingErr::Timeout { operation: "load", .. }));
    assert_eq!(gateway.active_version(), Some(first.clone()));
    assert!(matches!(gateway.state(), GatewayState::Ready(_)));
    assert_eq!(gateway.health().status, HealthStatus::Healthy);
    assert_eq!(sink.named(events::REFRESH_FAILED).len(), 1);

    let result = gateway.predict(json!({"numVotes": 100000})).await.unwrap();
    assert_eq!(result.model_version, first);

    slow.set_delay(Duration::ZERO);
    assert_eq!(
        gateway.refresh().await.unwrap(),
        RefreshOutcome::Swapped {
            previous: Some(first),
            version: second.clone(),
        }
    );
    assert_eq!(gateway.active_version(), Some(second));
}

#[test]
fn test_predictions_past_their_budget_time_out() {
    // A single blocking thread, so holding it keeps every prediction queued.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let store = Arc::new(MemoryStore::new());
        let version = save_forest(&Registry::new(Arc::clone(&store)));
        let budget = Duration::from_millis(50);
        let config = ServingConfig {
            predict_timeout: budget,
            batch_timeout: budget,
            ..config()
        };
        let (gateway, sink) = gateway(&store, config);
        gateway.initialize().await.unwrap();

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let blocker = tokio::task::spawn_blocking(move || {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(400));
        });
        started_rx.await.unwrap();

        let title = json!({"startYear": 2010, "runtimeMinutes": 148, "numVotes": 2000000});
        let err = gateway.predict(title.clone()).await.unwrap_err();
        assert_eq!(
            err,
            ServingErr::Timeout {
                operation: "predict",
                budget,
            }
        );
        assert!(err.is_retryable());

        let err = gateway.predict_batch(vec![title.clone(); 3]).await.unwrap_err();
        assert!(matches!(err, ServingErr::Timeout { operation: "predict_batch", .. }));

        let errors = sink.named(events::PREDICT_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["kind"], "timeout");
        assert!(sink.named(events::PREDICT_OK).is_empty());

        blocker.await.unwrap();
        let result = gateway.predict(title).await.unwrap();
        assert_eq!(result.model_version, version);
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swaps_are_atomic_for_concurrent_predictions() {
    const SWAPS: usize = 20;
    const PREDICTORS: usize = 4;

    // Without votes, each artifact fills its own default: A predicts 5 + 5000 * 1e-5 = 5.05 and
    // B predicts 4 + 200000 * 2e-5 = 8.0. Mixing the contract of one with the estimator of the
    // other would give 4.1 or 7.0.
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(Arc::clone(&store));
    let save_a = || (save_linear_with(&registry, 1e-5, 5.0, 5000.0), 5.05);
    let save_b = || (save_linear_with(&registry, 2e-5, 4.0, 200_000.0), 8.0);

    let mut expected = HashMap::new();
    let (first, rating) = save_a();
    expected.insert(first, rating);

    let (gateway, _) = gateway(&store, config());
    gateway.initialize().await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let predictors: Vec<_> = (0..PREDICTORS)
        .map(|_| {
            let gateway = gateway.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while !done.load(Ordering::Acquire) {
                    let result = gateway
                        .predict(json!({"startYear": 2000, "runtimeMinutes": 100}))
                        .await
                        .unwrap();
                    seen.push((result.model_version, result.raw_prediction));
                }
                seen
            })
        })
        .collect();

    for i in 0..SWAPS {
        let (version, rating) = if i % 2 == 0 { save_b() } else { save_a() };
        expected.insert(version.clone(), rating);

        let outcome = gateway.refresh().await.unwrap();
        assert_eq!(outcome.version(), &version);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    done.store(true, Ordering::Release);

    let mut versions = HashSet::new();
    for predictor in predictors {
        for (version, raw) in predictor.await.unwrap() {
            let want = expected[&version];
            assert!((raw - want).abs() < 1e-3, "{version} predicted {raw}, expected {want}");
            versions.insert(version);
        }
    }

    assert!(versions.len() > 1, "predictions only saw {versions:?}");
}
