use std::{error::Error, fmt, io};

use artifact::{ArtifactErr, ContractErr};
use machine_learning::MlErr;

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// All errors that can occur while training and publishing a model.
#[derive(Debug)]
pub enum TrainerErr {
    /// Invalid configuration, caught before touching any data.
    InvalidConfig(String),
    /// A training row can't be used, rows are numbered from 1.
    InvalidRow { row: usize, reason: String },
    Contract(ContractErr),
    Fit(MlErr),
    Artifact(ArtifactErr),
    Io(io::Error),
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::InvalidRow { row, reason } => write!(f, "invalid row {row}: {reason}"),
            Self::Contract(e) => write!(f, "contract error: {e}"),
            Self::Fit(e) => write!(f, "fit error: {e}"),
            Self::Artifact(e) => write!(f, "artifact error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Contract(e) => Some(e),
            Self::Fit(e) => Some(e),
            Self::Artifact(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ContractErr> for TrainerErr {
    fn from(value: ContractErr) -> Self {
        Self::Contract(value)
    }
}

impl From<MlErr> for TrainerErr {
    fn from(value: MlErr) -> Self {
        Self::Fit(value)
    }
}

impl From<ArtifactErr> for TrainerErr {
    fn from(value: ArtifactErr) -> Self {
        Self::Artifact(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainerErr> for io::Error {
    fn from(value: TrainerErr) -> Self {
        match value {
            TrainerErr::Io(e) => e,
            TrainerErr::Artifact(e) => e.into(),
            TrainerErr::InvalidConfig(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
