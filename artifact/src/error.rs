use std::{error::Error, fmt, io};

use crate::version::VersionId;

/// A request that doesn't satisfy a `FeatureContract`. Always caused by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractErr {
    /// The request or contract is malformed in a way the fill policy can't repair.
    Schema {
        field: Option<String>,
        reason: String,
    },
    /// A supplied value can't be coerced into its feature's declared type.
    TypeCoercion {
        field: String,
        expected: &'static str,
        got: String,
    },
}

impl ContractErr {
    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            field: Some(field.into()),
            reason: reason.into(),
        }
    }

    /// The offending field, if the error is about a single one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Schema { field, .. } => field.as_deref(),
            Self::TypeCoercion { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for ContractErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema {
                field: Some(field),
                reason,
            } => write!(f, "schema error on `{field}`: {reason}"),
            Self::Schema {
                field: None,
                reason,
            } => write!(f, "schema error: {reason}"),
            Self::TypeCoercion {
                field,
                expected,
                got,
            } => write!(f, "can't coerce `{field}` into {expected}, got {got}"),
        }
    }
}

impl Error for ContractErr {}

/// The artifact module's result type.
pub type Result<T> = std::result::Result<T, ArtifactErr>;

/// Failures persisting, finding or decoding model artifacts.
#[derive(Debug)]
pub enum ArtifactErr {
    /// The requested version, or any version when `None`, isn't in the store.
    NotFound { version: Option<VersionId> },
    /// An artifact was found but it's unusable.
    Corruption { version: String, reason: String },
    /// A version is already taken, versions are never overwritten.
    AlreadyExists(VersionId),
    Io(io::Error),
}

impl ArtifactErr {
    pub(crate) fn corruption(version: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Corruption {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ArtifactErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { version: Some(v) } => write!(f, "artifact {v} not found"),
            Self::NotFound { version: None } => f.write_str("the artifact store is empty"),
            Self::Corruption { version, reason } => {
                write!(f, "artifact {version} is corrupt: {reason}")
            }
            Self::AlreadyExists(v) => write!(f, "artifact {v} already exists"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ArtifactErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ArtifactErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ArtifactErr> for io::Error {
    fn from(value: ArtifactErr) -> Self {
        match value {
            ArtifactErr::Io(e) => e,
            ArtifactErr::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, value),
            ArtifactErr::AlreadyExists(_) => io::Error::new(io::ErrorKind::AlreadyExists, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
