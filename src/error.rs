//! Error types for kpi-ledger

use std::fmt;

use crate::period::PeriodType;

/// Result type alias for kpi-ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for kpi-ledger
#[derive(Debug)]
pub enum Error {
    /// Arrow-related errors
    Arrow(arrow::error::ArrowError),
    /// Parquet-related errors
    Parquet(parquet::errors::ParquetError),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Unrecognized period name
    InvalidPeriod(String),
    /// Malformed date or range input (an inverted range is not an error)
    InvalidRange(String),
    /// Malformed argument other than a period or range
    InvalidArgument(String),
    /// Resampling requested in a direction the routine does not handle
    InvalidResample { from: PeriodType, to: PeriodType },
    /// Backing store could not be reached; the caller may retry
    StorageUnavailable(String),
    /// Object or partition missing from the backing store
    NotFound(String),
    /// Row batch did not match the observation layout
    InvalidSchema(String),
    /// Operation aborted by its cancellation token
    Cancelled,
    /// Internal error
    Internal(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Io(_))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arrow(e) => Some(e),
            Error::Parquet(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arrow(e) => write!(f, "Arrow error: {}", e),
            Error::Parquet(e) => write!(f, "Parquet error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidPeriod(name) => write!(f, "Invalid period type: {}", name),
            Error::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidResample { from, to } => {
                write!(f, "Cannot expand {} series into coarser {} buckets", from, to)
            }
            Error::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Error::NotFound(path) => write!(f, "Not found: {}", path),
            Error::InvalidSchema(msg) => write!(f, "Invalid schema: {}", msg),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Error::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Parquet(e)
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            other => Error::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
