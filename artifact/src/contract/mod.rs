mod feature;
mod validate;

pub use feature::{FeatureContract, FeatureKind, FeatureSpec, ValueRange};
pub use validate::{CoercedValue, PredictionRequest, ValidatedInput};
