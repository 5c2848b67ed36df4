use crate::precision::Precision;

use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by container operations.
///
/// Every variant except [`Error::StorageIo`] describes a logical failure
/// detected before the storage engine is touched. `StorageIo` carries the
/// engine's own error and leaves the container in an unspecified state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported precision: {0}")]
    UnsupportedPrecision(String),
    #[error("backend '{id}' is not available: {reason}")]
    BackendUnavailable { id: String, reason: String },
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("attribute '{key}' not found on {path}")]
    AttributeNotFound { path: String, key: String },
    #[error("precision mismatch: array is {expected}, data is {actual}")]
    PrecisionMismatch {
        expected: Precision,
        actual: Precision,
    },
    #[error("array {0} is not extendable")]
    NotExtendable(String),
    #[error("{path} is not a {expected}")]
    NodeKind { path: String, expected: &'static str },
    #[error("invalid node name: {0:?}")]
    InvalidName(String),
    #[error("container is opened read-only")]
    ReadOnly,
    #[error(transparent)]
    StorageIo(#[from] anyhow::Error),
}

/// Field-free discriminant of [`Error`], used to compare outcomes
/// without comparing messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedPrecision,
    BackendUnavailable,
    NodeNotFound,
    NodeExists,
    ShapeMismatch,
    AttributeNotFound,
    PrecisionMismatch,
    NotExtendable,
    NodeKind,
    InvalidName,
    ReadOnly,
    StorageIo,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedPrecision(_) => ErrorKind::UnsupportedPrecision,
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::NodeNotFound(_) => ErrorKind::NodeNotFound,
            Error::NodeExists(_) => ErrorKind::NodeExists,
            Error::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Error::AttributeNotFound { .. } => ErrorKind::AttributeNotFound,
            Error::PrecisionMismatch { .. } => ErrorKind::PrecisionMismatch,
            Error::NotExtendable(_) => ErrorKind::NotExtendable,
            Error::NodeKind { .. } => ErrorKind::NodeKind,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::ReadOnly => ErrorKind::ReadOnly,
            Error::StorageIo(_) => ErrorKind::StorageIo,
        }
    }

    pub(crate) fn unavailable(id: impl Display, reason: impl Display) -> Self {
        Error::BackendUnavailable {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Attaches a description of the failed engine operation and lifts the
/// engine error into [`Error::StorageIo`].
pub(crate) trait StorageContext<T> {
    fn storage(self, what: impl Display) -> Result<T>;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn storage(self, what: impl Display) -> Result<T> {
        self.map_err(|e| Error::StorageIo(anyhow::Error::new(e).context(what.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        let err = Error::NodeNotFound("/pressure".to_string());
        assert_eq!(err.kind(), ErrorKind::NodeNotFound);
        assert_eq!(err.to_string(), "node not found: /pressure");

        let err: Error = anyhow::anyhow!("disk on fire").into();
        assert_eq!(err.kind(), ErrorKind::StorageIo);
    }

    #[test]
    fn test_storage_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = res.storage("writing /a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageIo);
        assert!(format!("{:#}", err).contains("writing /a"));
    }
}
