use std::io::{self, SeekFrom};

use poem::error::ParseMultipartError;
use poem::web::Multipart;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::StorageError;
use crate::storage::BlobStream;

/// The form field every uploaded file is expected under.
pub const UPLOAD_FIELD: &str = "myfiles";

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("malformed multipart body: {0}")]
    Malformed(#[from] ParseMultipartError),

    #[error("failed to read multipart body: {0}")]
    Read(io::Error),

    #[error(transparent)]
    TooLarge(StorageError),

    #[error("failed to spool upload: {0}")]
    Spool(io::Error),
}

/// One file part, spooled to an anonymous temporary file.
///
/// The temporary file has no name on disk and disappears once the handle
/// is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    size: u64,
    spool: tokio::fs::File,
}

impl UploadedFile {
    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_stream(self) -> BlobStream<'static> {
        Box::pin(self.spool)
    }
}

/// A fully decoded upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<UploadedFile>,
}

impl UploadForm {
    /// Decodes every part of the body, keeping the parts under
    /// [`UPLOAD_FIELD`] which carry a non-empty filename.
    ///
    /// All parts, kept or not, count towards `limit`.
    pub async fn parse(mut multipart: Multipart, limit: u64) -> Result<Self, FormError> {
        let mut remaining = limit;
        let mut files = vec![];

        while let Some(field) = multipart.next_field().await? {
            // Browsers send an empty filename for a file input left blank.
            let keep = field.name() == Some(UPLOAD_FIELD)
                && field.file_name().map_or(false, |name| !name.trim().is_empty());
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(ToString::to_string);

            // One byte past the budget is enough to tell it was exceeded.
            let mut reader = Box::pin(field.into_async_read()).take(remaining.saturating_add(1));

            if keep {
                let file = tokio::task::spawn_blocking(tempfile::tempfile)
                    .await
                    .map_err(|e| FormError::Spool(io::Error::new(io::ErrorKind::Other, e)))?
                    .map_err(FormError::Spool)?;
                let mut spool = tokio::fs::File::from_std(file);

                let size = tokio::io::copy(&mut reader, &mut spool)
                    .await
                    .map_err(FormError::Read)?;
                remaining = consume_budget(remaining, size, limit)?;

                spool.seek(SeekFrom::Start(0)).await.map_err(FormError::Spool)?;

                debug!("spooled {} ({} bytes)", &filename, size);
                files.push(UploadedFile {
                    filename,
                    content_type,
                    size,
                    spool,
                });
            } else {
                let size = tokio::io::copy(&mut reader, &mut tokio::io::sink())
                    .await
                    .map_err(FormError::Read)?;
                remaining = consume_budget(remaining, size, limit)?;
            }
        }

        Ok(Self { files })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> Vec<UploadedFile> {
        self.files
    }
}

fn consume_budget(remaining: u64, size: u64, limit: u64) -> Result<u64, FormError> {
    remaining
        .checked_sub(size)
        .ok_or(FormError::TooLarge(StorageError::CapacityExceeded { limit }))
}
