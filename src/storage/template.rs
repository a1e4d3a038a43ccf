use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Blob, BlobRecord, RecordSummary};

/// A readable byte stream handed to a backend, consumed in full on store.
pub type BlobStream<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// How a blob is addressed.
///
/// Filesystem storage is keyed by the client's filename, record storage by
/// a generated id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlobKey {
    Name(String),
    Id(Uuid),
}

impl BlobKey {
    pub fn as_id(&self) -> StorageResult<Uuid> {
        match self {
            Self::Id(id) => Ok(*id),
            Self::Name(name) => Err(StorageError::validation(format!(
                "{:?} is a filename, this backend is addressed by record id",
                name
            ))),
        }
    }

    pub fn as_name(&self) -> StorageResult<&str> {
        match self {
            Self::Name(name) => Ok(name),
            Self::Id(id) => Err(StorageError::validation(format!(
                "{} is a record id, this backend is addressed by filename",
                id
            ))),
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// A short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Checks the medium can currently accept writes.
    async fn ready(&self) -> StorageResult<()>;

    /// Consumes `stream` and persists it as the file `filename`.
    ///
    /// The returned key is what the blob can be fetched by afterwards.
    /// Record stores answer `Unsupported`.
    async fn store(&self, filename: &str, stream: BlobStream<'_>) -> StorageResult<BlobKey>;

    /// Writes a fully built record under its own id.
    ///
    /// Stores without metadata answer `Unsupported`.
    async fn insert(&self, record: &BlobRecord) -> StorageResult<()>;

    async fn fetch(&self, key: &BlobKey) -> StorageResult<Blob>;

    /// Best-effort batch removal.
    async fn delete(&self, keys: &[BlobKey]) -> StorageResult<()>;

    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Vec<RecordSummary>>;
}

/// Reads the whole stream into memory.
///
/// Records are written as one row, so the payload has to be complete first.
pub async fn buffer_stream(mut stream: BlobStream<'_>) -> StorageResult<Bytes> {
    let mut buff = BytesMut::new();
    while stream.read_buf(&mut buff).await? != 0 {}
    Ok(buff.freeze())
}
