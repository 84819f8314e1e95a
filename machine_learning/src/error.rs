use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    EmptyDataset,
    InvalidHyperParam {
        name: &'static str,
        reason: String,
    },
    SingularSystem,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::EmptyDataset => f.write_str("Tried to fit a model over an empty dataset"),
            MlErr::InvalidHyperParam { name, reason } => {
                write!(f, "Invalid hyper-parameter `{name}`: {reason}")
            }
            MlErr::SingularSystem => {
                f.write_str("The normal equations are singular, the design matrix has no full rank")
            }
        }
    }
}

impl Error for MlErr {}
