use log::info;
use parking_lot::Mutex;
use serde_json::Value;

/// Event names emitted by the gateway.
pub mod events {
    pub const PREDICT_OK: &str = "predict.ok";
    pub const PREDICT_ERROR: &str = "predict.error";
    pub const PREDICT_OUT_OF_RANGE: &str = "predict.out_of_range";
    pub const MODEL_LOADED: &str = "model.loaded";
    pub const REFRESH_FAILED: &str = "model.refresh_failed";
    pub const ARTIFACT_CORRUPT: &str = "artifact.corrupt";
}

/// Where the gateway sends its structured events.
pub trait TelemetrySink: Send + Sync {
    /// Records a single event.
    ///
    /// # Arguments
    /// * `event` - The event's name, one of `events`.
    /// * `fields` - A json object with the event's fields.
    fn emit(&self, event: &str, fields: Value);
}

/// Writes every event as a structured log line under the `telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, event: &str, fields: Value) {
        info!(target: "telemetry", event = event; "{fields}");
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far, oldest first.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// The fields of every recorded `event`.
    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &str, fields: Value) {
        self.events.lock().push((event.to_string(), fields));
    }
}
