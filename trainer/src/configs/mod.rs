mod features;
mod training;

pub use features::{TARGET_COLUMN, imdb_features};
pub use training::{DatasetConfig, TrainingConfig};
