mod bundle;
pub mod codec;
pub mod contract;
pub mod error;
pub mod registry;
pub mod store;
pub mod version;

pub use bundle::{ArtifactMetadata, ModelArtifact, TrainingSummary, validate_integrity};
pub use contract::{
    CoercedValue, FeatureContract, FeatureKind, FeatureSpec, PredictionRequest, ValidatedInput,
};
pub use error::{ArtifactErr, ContractErr, Result};
pub use registry::Registry;
pub use store::{ArtifactStore, FsStore, MemoryStore};
pub use version::{VersionClock, VersionId, VersionSelector};
