//! Amazon S3 (and S3-compatible) object store.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{content_type_for, ObjectStore, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct S3StoreConfig {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    /// Path-style addressing, needed by MinIO and friends.
    pub force_path_style: bool,
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore").finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Builds a client from the ambient AWS environment plus `config`.
    pub async fn connect(config: &S3StoreConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn classify<E, R>(bucket: &str, key: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let detail = DisplayErrorContext(&err).to_string();
    match code.as_deref() {
        Some("NoSuchKey") | Some("NotFound") | Some("NoSuchBucket") => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("AccessDenied") | Some("Forbidden") | Some("InvalidAccessKeyId")
        | Some("SignatureDoesNotMatch") => StoreError::PermissionDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
            detail,
        },
        _ => StoreError::Transient {
            bucket: bucket.to_string(),
            key: key.to_string(),
            detail,
        },
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<u64> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::local(parent, source))?;
        }
        let mut file = fs::File::create(destination)
            .await
            .map_err(|source| StoreError::local(destination, source))?;
        let mut body = response.body;
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(|err| StoreError::Transient {
            bucket: bucket.to_string(),
            key: key.to_string(),
            detail: err.to_string(),
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|source| StoreError::local(destination, source))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| StoreError::local(destination, source))?;
        debug!(bucket, key, bytes = written, "downloaded object");
        Ok(written)
    }

    async fn put(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|err| StoreError::Local {
                path: source.to_path_buf(),
                source: std::io::Error::other(err.to_string()),
            })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type_for(source))
            .body(body)
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;
        debug!(bucket, key, "uploaded object");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;
        debug!(bucket, key, "deleted object");
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("s3://{bucket}/{key}")
    }
}
