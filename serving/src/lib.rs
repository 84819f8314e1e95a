pub mod config;
pub mod error;
pub mod frontend;
pub mod gateway;
pub mod prediction;
pub mod refresh;
pub mod telemetry;

pub use config::{RatingRange, ServingConfig};
pub use error::{Result, ServingErr};
pub use gateway::{Gateway, GatewayState, Health, HealthStatus, ModelInfo, RefreshOutcome};
pub use prediction::{Confidence, ConfidenceBand, PredictionResult};
pub use telemetry::{LogSink, MemorySink, TelemetrySink};
