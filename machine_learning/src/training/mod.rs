mod fit;

pub use fit::{AlgorithmParams, FitOptions, FittedModel, fit};
