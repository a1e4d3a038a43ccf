use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::models::{BlobRecord, RecordSummary, StoredFile, FALLBACK_CONTENT_TYPE};
use crate::storage::{buffer_stream, BlobKey, BlobStream, StorageBackend};

/// Mediates between the HTTP handlers and the storage backends.
///
/// Three backends are held: the uploads directory, the read-only assets
/// directory the download is served from, and the configured record store.
pub struct IngestionService {
    uploads: Arc<dyn StorageBackend>,
    assets: Arc<dyn StorageBackend>,
    records: Arc<dyn StorageBackend>,
}

impl IngestionService {
    pub fn new(
        uploads: Arc<dyn StorageBackend>,
        assets: Arc<dyn StorageBackend>,
        records: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            uploads,
            assets,
            records,
        }
    }

    /// Streams one upload into the uploads directory under `filename`.
    ///
    /// Fails with `DestinationMissing` when the directory is absent.
    #[instrument(skip(self, stream), level = "debug")]
    pub async fn save_to_filesystem(
        &self,
        filename: &str,
        stream: BlobStream<'_>,
    ) -> StorageResult<StoredFile> {
        self.uploads.ready().await?;

        let key = self.uploads.store(filename, stream).await?;
        Ok(StoredFile {
            filename: key.to_string(),
        })
    }

    /// Buffers one upload and writes it as a new record, returning its id.
    #[instrument(skip(self, stream), level = "debug")]
    pub async fn save_to_record_store(
        &self,
        content_type: &str,
        stream: BlobStream<'_>,
    ) -> StorageResult<Uuid> {
        let content = buffer_stream(stream).await?;
        let record = BlobRecord::new(content_type, content);

        self.records.insert(&record).await?;
        debug!("stored record {} ({} bytes)", record.id(), record.content().len());

        Ok(record.id())
    }

    pub async fn fetch_by_id(&self, id: Uuid) -> StorageResult<BlobRecord> {
        let blob = self.records.fetch(&BlobKey::Id(id)).await?;
        let content_type = blob
            .content_type
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        Ok(BlobRecord::from_parts(id, content_type, blob.data))
    }

    /// Reads a file from the assets directory.
    pub async fn fetch_by_filename(&self, filename: &str) -> StorageResult<Bytes> {
        let blob = self.assets.fetch(&BlobKey::Name(filename.to_string())).await?;
        Ok(blob.data)
    }

    pub async fn delete_records(&self, ids: &[Uuid]) -> StorageResult<()> {
        let keys: Vec<BlobKey> = ids.iter().copied().map(BlobKey::Id).collect();
        self.records.delete(&keys).await
    }

    pub async fn list_records(&self, limit: u32, offset: u32) -> StorageResult<Vec<RecordSummary>> {
        self.records.list(limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;
    use crate::error::StorageError;
    use crate::storage::backends::sql::{DatabaseConfig, SqliteBackend};
    use crate::storage::backends::FileSystemBackend;

    struct Fixture {
        dir: TempDir,
        service: IngestionService,
    }

    async fn fixture() -> anyhow::Result<Fixture> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("uploads"))?;
        std::fs::create_dir(dir.path().join("assets"))?;

        let records = SqliteBackend::connect(&DatabaseConfig {
            connection_uri: format!("sqlite://{}", dir.path().join("db.sqlite").display()),
            pool_size: 1,
            table: "images".to_string(),
        })
        .await?;

        let service = IngestionService::new(
            Arc::new(FileSystemBackend::new(dir.path().join("uploads"))),
            Arc::new(FileSystemBackend::new(dir.path().join("assets"))),
            Arc::new(records),
        );

        Ok(Fixture { dir, service })
    }

    fn stream(data: &'static [u8]) -> BlobStream<'static> {
        Box::pin(Cursor::new(data))
    }

    #[tokio::test]
    async fn test_record_round_trip() -> anyhow::Result<()> {
        let fx = fixture().await?;

        let id = fx.service.save_to_record_store("text/plain", stream(b"hello")).await?;
        let record = fx.service.fetch_by_id(id).await?;

        assert_eq!(record.id(), id);
        assert_eq!(record.content_type(), "text/plain");
        assert_eq!(record.content().as_ref(), b"hello");

        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_save() -> anyhow::Result<()> {
        let fx = fixture().await?;

        let stored = fx.service.save_to_filesystem("cat.png", stream(b"meow")).await?;
        assert_eq!(stored.filename, "cat.png");
        assert_eq!(std::fs::read(fx.dir.path().join("uploads/cat.png"))?, b"meow");

        // Uploads are not visible through the assets path.
        assert!(fx.service.fetch_by_filename("cat.png").await.unwrap_err().is_not_found());

        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_save_needs_directory() -> anyhow::Result<()> {
        let fx = fixture().await?;
        std::fs::remove_dir(fx.dir.path().join("uploads"))?;

        let err = fx
            .service
            .save_to_filesystem("cat.png", stream(b"meow"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DestinationMissing(_)));
        assert!(!fx.dir.path().join("uploads").exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_asset() -> anyhow::Result<()> {
        let fx = fixture().await?;
        std::fs::write(fx.dir.path().join("assets/diagram.png"), b"png bytes")?;

        let data = fx.service.fetch_by_filename("diagram.png").await?;
        assert_eq!(data.as_ref(), b"png bytes");

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_list_records() -> anyhow::Result<()> {
        let fx = fixture().await?;

        let a = fx.service.save_to_record_store("image/png", stream(b"a")).await?;
        let b = fx.service.save_to_record_store("image/png", stream(b"b")).await?;
        assert_eq!(fx.service.list_records(10, 0).await?.len(), 2);

        fx.service.delete_records(&[a]).await?;
        assert!(fx.service.fetch_by_id(a).await.unwrap_err().is_not_found());
        assert_eq!(fx.service.fetch_by_id(b).await?.content().as_ref(), b"b");

        let remaining = fx.service.list_records(10, 0).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);

        Ok(())
    }

    #[tokio::test]
    async fn test_identical_uploads_get_distinct_records() -> anyhow::Result<()> {
        let fx = fixture().await?;

        let a = fx.service.save_to_record_store("image/png", stream(b"same")).await?;
        let b = fx.service.save_to_record_store("image/png", stream(b"same")).await?;
        assert_ne!(a, b);

        for id in [a, b] {
            assert_eq!(fx.service.fetch_by_id(id).await?.content().as_ref(), b"same");
        }

        Ok(())
    }
}
