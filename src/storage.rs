pub mod template;

pub mod backends {
    pub mod filesystem;
    pub mod register;
    pub mod scylladb;
    pub mod sql;

    pub use filesystem::FileSystemBackend;
    pub use register::BackendConfigs;
}

pub use template::{buffer_stream, BlobKey, BlobStream, StorageBackend};
