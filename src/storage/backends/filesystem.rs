use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StorageError, StorageResult};
use crate::models::{Blob, BlobRecord, RecordSummary};
use crate::storage::{BlobKey, BlobStream, StorageBackend};
use crate::utils::sanitize_filename;

/// Stores blobs as plain files directly under one managed directory.
///
/// The directory must already exist, it is never created here. No metadata
/// besides the bytes themselves is kept.
pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            directory: dir.into(),
        }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[inline]
    fn format_path(&self, key: &BlobKey) -> StorageResult<PathBuf> {
        let name = sanitize_filename(key.as_name()?)?;
        Ok(self.directory.join(name))
    }

    async fn ensure_directory(&self) -> StorageResult<()> {
        match tokio::fs::metadata(&self.directory).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::DestinationMissing(self.directory.clone())),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::DestinationMissing(self.directory.clone()))
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// Runs std filesystem work off the async workers.
async fn blocking<T, F>(func: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(func)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn ready(&self) -> StorageResult<()> {
        self.ensure_directory().await
    }

    async fn store(&self, filename: &str, mut stream: BlobStream<'_>) -> StorageResult<BlobKey> {
        let name = sanitize_filename(filename)?;
        self.ensure_directory().await?;

        let path = self.directory.join(&name);
        let directory = self.directory.clone();

        // The staging file is unlinked on drop, so an aborted copy never
        // leaves a truncated file behind under the real name.
        let (staging, file) = blocking(move || {
            let staging = tempfile::Builder::new()
                .prefix(".upload-")
                .suffix(".part")
                .tempfile_in(directory)?;
            let file = staging.reopen()?;
            Ok((staging, file))
        })
        .await?;

        let mut file = tokio::fs::File::from_std(file);
        let written = tokio::io::copy(&mut stream, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        let target = path.clone();
        blocking(move || staging.persist(target).map(drop).map_err(|e| e.error)).await?;

        debug!("Stored {} bytes @ {:?}", written, &path);
        Ok(BlobKey::Name(name))
    }

    async fn insert(&self, _record: &BlobRecord) -> StorageResult<()> {
        Err(StorageError::Unsupported(self.name()))
    }

    async fn fetch(&self, key: &BlobKey) -> StorageResult<Blob> {
        let path = self.format_path(key)?;

        debug!("Retrieving file @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Blob {
                data: Bytes::from(data),
                content_type: None,
            }),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(&self, keys: &[BlobKey]) -> StorageResult<()> {
        for key in keys {
            let path = self.format_path(key)?;
            debug!("Purging file @ {:?}", &path);

            match tokio::fs::remove_file(&path).await {
                Ok(()) => continue,
                Err(ref e) if e.kind() == ErrorKind::NotFound => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Ok(())
    }

    async fn list(&self, _limit: u32, _offset: u32) -> StorageResult<Vec<RecordSummary>> {
        Err(StorageError::Unsupported(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;

    fn stream(data: &[u8]) -> BlobStream<'static> {
        Box::pin(Cursor::new(data.to_vec()))
    }

    #[tokio::test]
    async fn test_round_trip() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let backend = FileSystemBackend::new(dir.path());

        let payload = b"\x89PNG\r\n\x1a\nnot really a png";
        let key = backend.store("cat.png", stream(payload)).await?;
        assert_eq!(key, BlobKey::Name("cat.png".to_string()));

        let blob = backend.fetch(&key).await?;
        assert_eq!(blob.data.as_ref(), payload);
        assert!(blob.content_type.is_none());

        let on_disk = std::fs::read(dir.path().join("cat.png"))?;
        assert_eq!(on_disk, payload);

        // Nothing but the final file is left in the directory.
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_last_writer_wins() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let backend = FileSystemBackend::new(dir.path());

        backend.store("a.txt", stream(b"first")).await?;
        backend.store("a.txt", stream(b"second")).await?;

        let blob = backend.fetch(&BlobKey::Name("a.txt".into())).await?;
        assert_eq!(blob.data.as_ref(), b"second");

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_created() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("uploads");
        let backend = FileSystemBackend::new(&target);

        let err = backend.store("a.txt", stream(b"data")).await.unwrap_err();
        assert!(matches!(err, StorageError::DestinationMissing(_)));
        assert!(backend.ready().await.is_err());
        assert!(!target.exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_traversal_stays_inside_directory() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let uploads = dir.path().join("uploads");
        std::fs::create_dir(&uploads)?;
        let backend = FileSystemBackend::new(&uploads);

        let key = backend.store("../escape.txt", stream(b"nope")).await?;
        assert_eq!(key, BlobKey::Name("escape.txt".to_string()));
        assert!(uploads.join("escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_and_delete_missing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let backend = FileSystemBackend::new(dir.path());

        let err = backend.fetch(&BlobKey::Name("ghost.png".into())).await.unwrap_err();
        assert!(err.is_not_found());

        backend.store("real.png", stream(b"x")).await?;
        backend
            .delete(&[BlobKey::Name("real.png".into()), BlobKey::Name("ghost.png".into())])
            .await?;
        assert!(!dir.path().join("real.png").exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_record_ids() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let backend = FileSystemBackend::new(dir.path());

        let err = backend.fetch(&BlobKey::Id(uuid::Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationFailure);

        let record = BlobRecord::new("image/png", Bytes::from_static(b"png"));
        let err = backend.insert(&record).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

        let err = backend.list(10, 0).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);

        Ok(())
    }
}
