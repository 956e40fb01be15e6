mod fs;
mod publish;
mod s3;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use self::fs::FsObjectStore;
pub use self::publish::{publish_tree, PublishFailure, PublishReport};
pub use self::s3::{S3ObjectStore, S3StoreConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },
    #[error("access to {bucket}/{key} denied: {detail}")]
    PermissionDenied {
        bucket: String,
        key: String,
        detail: String,
    },
    #[error("transfer of {bucket}/{key} failed: {detail}")]
    Transient {
        bucket: String,
        key: String,
        detail: String,
    },
    #[error("local file {path}: {source}")]
    Local {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{failed} of {total} uploads failed, first: {first}")]
    Publish {
        failed: usize,
        total: usize,
        first: Box<StoreError>,
    },
}

impl StoreError {
    pub(crate) fn local(path: &Path, source: std::io::Error) -> Self {
        StoreError::Local {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remote object storage. Objects are moved through local files at this
/// boundary so large media never has to sit in memory.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Downloads `bucket/key` into `destination`, returning the byte count.
    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<u64>;

    /// Uploads the file at `source` to `bucket/key`.
    async fn put(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()>;

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// URL handed back to callers when nothing public is configured.
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

/// MIME type for the files an HLS package contains.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}
