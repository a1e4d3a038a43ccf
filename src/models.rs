use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

/// Content type recorded for parts which did not declare one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A blob persisted in a record store.
///
/// The id is minted at construction and the payload is kept exactly as it
/// was uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    id: Uuid,
    content_type: String,
    content: Bytes,
}

impl BlobRecord {
    pub fn new(content_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: content_type.into(),
            content,
        }
    }

    /// Rebuilds a record which was previously read back from a store.
    pub(crate) fn from_parts(id: Uuid, content_type: String, content: Bytes) -> Self {
        Self {
            id,
            content_type,
            content,
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[inline]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

/// A file written by the filesystem backend, addressed by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
}

/// What any backend hands back from a fetch.
///
/// The content type is only known when the backend keeps metadata.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// A lightweight row used when listing a record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_records_get_unique_ids() {
        let a = BlobRecord::new("image/png", Bytes::from_static(b"a"));
        let b = BlobRecord::new("image/png", Bytes::from_static(b"a"));

        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_nil());
    }

    #[test]
    fn test_content_is_untouched() {
        let payload = Bytes::from_static(&[0, 159, 146, 150, 255]);
        let record = BlobRecord::new("image/x-custom", payload.clone());

        assert_eq!(record.content_type(), "image/x-custom");
        assert_eq!(record.into_content(), payload);
    }
}
