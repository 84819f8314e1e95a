use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use artifact::{ArtifactStore, ModelArtifact, Registry, VersionId, VersionSelector};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use machine_learning::{estimators::Algorithm, metrics::EvalMetrics, scaling::ScalerKind};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::{sync::Mutex, task, time};

use crate::{
    config::ServingConfig,
    error::{Result, ServingErr},
    prediction::{self, PredictionResult},
    telemetry::{LogSink, TelemetrySink, events},
};

/// The lifecycle of a gateway.
#[derive(Debug, Clone)]
pub enum GatewayState {
    Uninitialized,
    /// Serving with the given artifact.
    Ready(Arc<ModelArtifact>),
    /// No artifact could ever be loaded, the reason says why.
    Degraded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    pub active_model_version: Option<VersionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A description of the active model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_version: VersionId,
    pub algorithm: Algorithm,
    pub scaler: ScalerKind,
    pub feature_names: Vec<String>,
    pub n_features: usize,
    pub metrics: EvalMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
    pub trained_at: DateTime<Utc>,
}

/// What a successful refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The target version is already active.
    Unchanged { version: VersionId },
    Swapped {
        previous: Option<VersionId>,
        version: VersionId,
    },
}

impl RefreshOutcome {
    /// The version active after the refresh.
    pub fn version(&self) -> &VersionId {
        match self {
            Self::Unchanged { version } | Self::Swapped { version, .. } => version,
        }
    }
}

struct Inner<S> {
    registry: Registry<S>,
    config: ServingConfig,
    state: RwLock<GatewayState>,
    // Serializes loads, never held by predictions.
    refresh_lock: Mutex<()>,
    telemetry: Arc<dyn TelemetrySink>,
}

/// Serves predictions from the active model artifact.
///
/// The active artifact is an immutable snapshot behind a single lock: a refresh loads and checks
/// the new artifact off to the side and then swaps the reference, so a request sees either the
/// old artifact or the new one, never a mix. Cloning a gateway is cheap and clones share state.
pub struct Gateway<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Gateway<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ArtifactStore + 'static> Gateway<S> {
    /// Creates a new uninitialized gateway that logs its telemetry.
    pub fn new(registry: Registry<S>, config: ServingConfig) -> Self {
        Self::with_telemetry(registry, config, Arc::new(LogSink))
    }

    /// Creates a new uninitialized gateway.
    ///
    /// # Arguments
    /// * `registry` - Where artifacts are loaded from.
    /// * `config` - The gateway's settings.
    /// * `telemetry` - Where events are emitted to.
    pub fn with_telemetry(
        registry: Registry<S>,
        config: ServingConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                config,
                state: RwLock::new(GatewayState::Uninitialized),
                refresh_lock: Mutex::new(()),
                telemetry,
            }),
        }
    }

    pub fn config(&self) -> &ServingConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.inner.registry
    }

    pub fn state(&self) -> GatewayState {
        self.inner.state.read().clone()
    }

    /// The active artifact, if any.
    pub fn active(&self) -> Option<Arc<ModelArtifact>> {
        match &*self.inner.state.read() {
            GatewayState::Ready(artifact) => Some(Arc::clone(artifact)),
            _ => None,
        }
    }

    pub fn active_version(&self) -> Option<VersionId> {
        self.active().map(|a| a.version().clone())
    }

    /// Loads the first artifact, retrying with exponential backoff.
    ///
    /// # Returns
    /// The loaded version, or the last error once the attempts are exhausted, in which case the
    /// gateway is left degraded. Corrupt artifacts aren't retried.
    pub async fn initialize(&self) -> Result<VersionId> {
        let attempts = self.inner.config.load_attempts.get();
        let mut backoff = self.inner.config.load_backoff;
        let mut attempt = 1;

        loop {
            match self.refresh().await {
                Ok(outcome) => return Ok(outcome.version().clone()),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    warn!("load attempt {attempt}/{attempts} failed, retrying in {backoff:?}: {e}");
                    time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Adopts the configured version if it differs from the active one.
    ///
    /// A failure leaves a ready gateway serving its current artifact, and an uninitialized one
    /// degraded. A degraded gateway becomes ready on success.
    ///
    /// # Returns
    /// What the refresh did, or why it failed.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _guard = self.inner.refresh_lock.lock().await;
        let previous = self.active_version();

        match self.fetch(previous.clone()).await {
            Ok(None) => Ok(RefreshOutcome::Unchanged {
                version: previous.ok_or_else(|| {
                    ServingErr::ModelUnavailable("no active artifact to keep".into())
                })?,
            }),
            Ok(Some(artifact)) => {
                let version = artifact.version().clone();
                let algorithm = artifact.algorithm();
                *self.inner.state.write() = GatewayState::Ready(Arc::new(artifact));

                info!(version = version.as_str(), algorithm = algorithm.as_str(); "model loaded");
                self.emit(
                    events::MODEL_LOADED,
                    json!({"version": version, "previous": previous, "algorithm": algorithm}),
                );
                Ok(RefreshOutcome::Swapped { previous, version })
            }
            Err(e) => {
                self.record_load_failure(&e, previous.as_ref());
                Err(e)
            }
        }
    }

    /// Resolves the configured version and loads it unless it's `active`, within the load budget.
    async fn fetch(&self, active: Option<VersionId>) -> Result<Option<ModelArtifact>> {
        let inner = Arc::clone(&self.inner);
        let load = task::spawn_blocking(move || -> Result<Option<ModelArtifact>> {
            let version = inner.registry.resolve(&inner.config.model_version)?;
            if active.as_ref() == Some(&version) {
                return Ok(None);
            }

            let artifact = inner.registry.load(&VersionSelector::Pinned(version))?;
            Ok(Some(artifact))
        });

        let budget = self.inner.config.load_timeout;
        match time::timeout(budget, load).await {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) => Err(ServingErr::ModelUnavailable(format!("load task failed: {e}"))),
            Err(_) => Err(ServingErr::Timeout {
                operation: "load",
                budget,
            }),
        }
    }

    fn record_load_failure(&self, err: &ServingErr, active: Option<&VersionId>) {
        if let ServingErr::Corruption { version, reason } = err {
            error!(version = version.as_str(); "refusing corrupt artifact: {reason}");
            self.emit(
                events::ARTIFACT_CORRUPT,
                json!({"version": version, "reason": reason}),
            );
        }

        let mut state = self.inner.state.write();
        match &*state {
            GatewayState::Ready(artifact) => {
                warn!("refresh failed, still serving {}: {err}", artifact.version());
            }
            _ => {
                warn!("no model to serve: {err}");
                *state = GatewayState::Degraded(err.to_string());
            }
        }
        drop(state);

        self.emit(
            events::REFRESH_FAILED,
            json!({"kind": err.kind(), "reason": err.to_string(), "active": active}),
        );
    }

    fn snapshot(&self) -> Result<Arc<ModelArtifact>> {
        match &*self.inner.state.read() {
            GatewayState::Ready(artifact) => Ok(Arc::clone(artifact)),
            GatewayState::Uninitialized => Err(ServingErr::ModelUnavailable(
                "the gateway is not initialized".into(),
            )),
            GatewayState::Degraded(reason) => Err(ServingErr::ModelUnavailable(reason.clone())),
        }
    }

    /// Predicts the rating of a single request.
    ///
    /// # Arguments
    /// * `request` - A json object mapping feature names to raw values.
    ///
    /// # Returns
    /// The prediction, a client error if the request doesn't satisfy the active contract,
    /// `ModelUnavailable` if there's no active artifact or `Timeout` past the predict budget.
    pub async fn predict(&self, request: impl Into<Value>) -> Result<PredictionResult> {
        let artifact = self.snapshot()?;
        let request = request.into();
        let range = self.inner.config.rating_range;
        let budget = self.inner.config.predict_timeout;
        let start = Instant::now();

        let work = task::spawn_blocking(move || prediction::infer(&artifact, &request, range));
        let result = match time::timeout(budget, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ServingErr::ModelUnavailable(format!("predict task failed: {e}"))),
            Err(_) => Err(ServingErr::Timeout {
                operation: "predict",
                budget,
            }),
        };

        self.record_prediction(&result, start.elapsed());
        result
    }

    /// Predicts every request of a batch against the same artifact.
    ///
    /// Items are independent: a bad item fails alone and the outcomes keep the input order.
    ///
    /// # Returns
    /// One outcome per request, or a schema error if there are more than `max_batch` requests,
    /// `ModelUnavailable` if there's no active artifact or `Timeout` past the batch budget.
    pub async fn predict_batch(
        &self,
        requests: Vec<Value>,
    ) -> Result<Vec<Result<PredictionResult>>> {
        let max = self.inner.config.max_batch;
        if requests.len() > max {
            return Err(ServingErr::Schema {
                field: None,
                reason: format!("a batch holds at most {max} requests, got {}", requests.len()),
            });
        }

        let artifact = self.snapshot()?;
        let range = self.inner.config.rating_range;
        let budget = self.inner.config.batch_timeout;
        let start = Instant::now();

        let work = task::spawn_blocking(move || {
            requests
                .par_iter()
                .map(|request| prediction::infer(&artifact, request, range))
                .collect::<Vec<_>>()
        });

        let results = match time::timeout(budget, work).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                return Err(ServingErr::ModelUnavailable(format!(
                    "batch task failed: {e}"
                )));
            }
            Err(_) => {
                return Err(ServingErr::Timeout {
                    operation: "predict_batch",
                    budget,
                });
            }
        };

        let elapsed = start.elapsed();
        for result in &results {
            self.record_prediction(result, elapsed);
        }
        Ok(results)
    }

    fn record_prediction(&self, result: &Result<PredictionResult>, elapsed: Duration) {
        let latency_us = elapsed.as_micros() as u64;

        match result {
            Ok(prediction) => {
                self.emit(
                    events::PREDICT_OK,
                    json!({"version": prediction.model_version, "latency_us": latency_us}),
                );

                if !prediction.out_of_range.is_empty() {
                    self.emit(
                        events::PREDICT_OUT_OF_RANGE,
                        json!({
                            "version": prediction.model_version,
                            "fields": prediction.out_of_range,
                        }),
                    );
                }
            }
            Err(e) => self.emit(
                events::PREDICT_ERROR,
                json!({"kind": e.kind(), "field": e.field(), "latency_us": latency_us}),
            ),
        }
    }

    pub fn health(&self) -> Health {
        match &*self.inner.state.read() {
            GatewayState::Ready(artifact) => Health {
                status: HealthStatus::Healthy,
                active_model_version: Some(artifact.version().clone()),
                reason: None,
            },
            GatewayState::Uninitialized => Health {
                status: HealthStatus::Degraded,
                active_model_version: None,
                reason: Some("not initialized".into()),
            },
            GatewayState::Degraded(reason) => Health {
                status: HealthStatus::Degraded,
                active_model_version: None,
                reason: Some(reason.clone()),
            },
        }
    }

    /// Describes the active model.
    pub fn model_info(&self) -> Result<ModelInfo> {
        let artifact = self.snapshot()?;
        let metadata = artifact.metadata();

        Ok(ModelInfo {
            model_version: artifact.version().clone(),
            algorithm: artifact.algorithm(),
            scaler: artifact.scaler().kind(),
            feature_names: artifact.contract().names().map(String::from).collect(),
            n_features: artifact.contract().len(),
            metrics: metadata.metrics,
            train_rows: metadata.train_rows,
            test_rows: metadata.test_rows,
            trained_at: metadata.trained_at,
        })
    }

    fn emit(&self, event: &str, fields: Value) {
        self.inner.telemetry.emit(event, fields);
    }
}
