use std::io;
use std::path::PathBuf;

use strum::Display;
use uuid::Uuid;

/// The broad class a [`StorageError`] falls into.
///
/// The transport layer decides status codes from this rather than from the
/// concrete variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailure,
    CapacityExceeded,
    ResourceUnavailable,
    NotFound,
    IoFailure,
    /// The backend does not offer the requested operation at all.
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The caller supplied something the storage layer can not accept.
    #[error("invalid input: {0}")]
    Validation(String),

    /// More bytes were offered than the configured ceiling allows.
    #[error("upload exceeds the {limit} byte limit")]
    CapacityExceeded { limit: u64 },

    /// The managed directory is not there, it is never created on demand.
    #[error("destination directory {} does not exist", .0.display())]
    DestinationMissing(PathBuf),

    /// The backing medium can not currently be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("no blob stored under {0}")]
    NotFound(String),

    #[error("operation not supported by the {0} backend")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::DestinationMissing(_) | Self::Unavailable(_) => ErrorKind::ResourceUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Database(_) => ErrorKind::IoFailure,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn record_not_found(id: Uuid) -> Self {
        Self::NotFound(id.to_string())
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("requested row".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::Unavailable(e.to_string()),
            sqlx::Error::Io(e) => Self::Io(e),
            other => Self::Database(other.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
