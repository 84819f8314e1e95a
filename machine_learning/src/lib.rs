pub mod dataset;
pub mod error;
pub mod estimators;
pub mod metrics;
pub mod scaling;
pub mod training;

pub use error::{MlErr, Result};
