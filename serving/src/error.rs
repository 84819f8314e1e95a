use std::{error::Error, fmt, io, time::Duration};

use artifact::{ArtifactErr, ContractErr, VersionId};
use machine_learning::MlErr;

/// The serving module's result type.
pub type Result<T> = std::result::Result<T, ServingErr>;

/// Everything a gateway call can fail with.
///
/// `Schema` and `TypeCoercion` are caused by the client and must not be retried. The rest are
/// caused by the server, see `is_retryable`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServingErr {
    Schema {
        field: Option<String>,
        reason: String,
    },
    TypeCoercion {
        field: String,
        expected: &'static str,
        got: String,
    },
    ArtifactNotFound(Option<VersionId>),
    /// An artifact was found but is unusable, it's never adopted.
    Corruption {
        version: String,
        reason: String,
    },
    /// There's no model to serve with, the reason says why.
    ModelUnavailable(String),
    Timeout {
        operation: &'static str,
        budget: Duration,
    },
}

impl ServingErr {
    /// Whether the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::TypeCoercion { .. })
    }

    /// Whether the caller may retry the same call after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound(_) | Self::ModelUnavailable(_) | Self::Timeout { .. }
        )
    }

    /// A stable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema_error",
            Self::TypeCoercion { .. } => "type_coercion_error",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::Corruption { .. } => "corruption_error",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// The request field at fault, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Schema { field, .. } => field.as_deref(),
            Self::TypeCoercion { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for ServingErr {
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
            Self::ArtifactNotFound(Some(version)) => write!(f, "artifact {version} not found"),
            Self::ArtifactNotFound(None) => f.write_str("no artifact has been published yet"),
            Self::Corruption { version, reason } => {
                write!(f, "artifact {version} is corrupt: {reason}")
            }
            Self::ModelUnavailable(reason) => write!(f, "model unavailable: {reason}"),
            Self::Timeout { operation, budget } => {
                write!(f, "{operation} exceeded its {}ms budget", budget.as_millis())
            }
        }
    }
}

impl Error for ServingErr {}

impl From<ContractErr> for ServingErr {
    fn from(value: ContractErr) -> Self {
        match value {
            ContractErr::Schema { field, reason } => Self::Schema { field, reason },
            ContractErr::TypeCoercion {
                field,
                expected,
                got,
            } => Self::TypeCoercion {
                field,
                expected,
                got,
            },
        }
    }
}

impl From<ArtifactErr> for ServingErr {
    fn from(value: ArtifactErr) -> Self {
        match value {
            ArtifactErr::NotFound { version } => Self::ArtifactNotFound(version),
            ArtifactErr::Corruption { version, reason } => Self::Corruption { version, reason },
            other => Self::ModelUnavailable(other.to_string()),
        }
    }
}

impl From<MlErr> for ServingErr {
    fn from(value: MlErr) -> Self {
        Self::ModelUnavailable(format!("inference failed: {value}"))
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ServingErr> for io::Error {
    fn from(value: ServingErr) -> Self {
        let kind = match &value {
            ServingErr::Schema { .. } | ServingErr::TypeCoercion { .. } => {
                io::ErrorKind::InvalidInput
            }
            ServingErr::ArtifactNotFound(_) => io::ErrorKind::NotFound,
            ServingErr::Corruption { .. } => io::ErrorKind::InvalidData,
            ServingErr::ModelUnavailable(_) => io::ErrorKind::Other,
            ServingErr::Timeout { .. } => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, value)
    }
}
