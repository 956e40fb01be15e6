use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{ObjectStore, StoreError, StoreResult};

/// Marker file holding the payload of a key that is also a prefix of other
/// keys, e.g. `clip.mp4` once `clip.mp4/hls/master.m3u8` exists.
const PREFIX_PAYLOAD: &str = ".object";

/// Object store backed by a local directory: `bucket/key` lives at
/// `<root>/<bucket>/<key>`, or at `<root>/<bucket>/<key>/.object` when the
/// key doubles as a prefix.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|component| match component {
                Component::Normal(name) => name == PREFIX_PAYLOAD,
                _ => true,
            });
        if bucket.is_empty() || bucket.contains('/') || key.is_empty() || escapes {
            return Err(StoreError::PermissionDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: "key must be a relative path inside the bucket".into(),
            });
        }
        Ok(self.root.join(bucket).join(relative))
    }

    /// Payload location for an existing object path.
    async fn payload_path(object: PathBuf) -> PathBuf {
        match fs::metadata(&object).await {
            Ok(metadata) if metadata.is_dir() => object.join(PREFIX_PAYLOAD),
            _ => object,
        }
    }

    /// Creates the directories above `object`, pushing any object file that
    /// sits where a directory is needed down into that directory.
    async fn prepare_parents(&self, bucket: &str, key: &str, object: &Path) -> StoreResult<()> {
        let bucket_dir = self.root.join(bucket);
        let Some(parent) = object.parent() else {
            return Ok(());
        };
        let Ok(relative) = parent.strip_prefix(&bucket_dir) else {
            return Ok(());
        };
        let mut current = bucket_dir.clone();
        for component in relative.components() {
            current.push(component);
            if let Ok(metadata) = fs::metadata(&current).await {
                if metadata.is_file() {
                    let parked = current.with_file_name(format!(
                        ".{}.parked",
                        component.as_os_str().to_string_lossy()
                    ));
                    // A concurrent put may already have moved it.
                    match fs::rename(&current, &parked).await {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::NotFound => continue,
                        Err(err) => return Err(self.classify(bucket, key, err)),
                    }
                    match fs::create_dir(&current).await {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                        Err(err) => return Err(self.classify(bucket, key, err)),
                    }
                    fs::rename(&parked, current.join(PREFIX_PAYLOAD))
                        .await
                        .map_err(|err| self.classify(bucket, key, err))?;
                    debug!(path = %current.display(), "object became a prefix");
                }
            }
        }
        fs::create_dir_all(parent)
            .await
            .map_err(|err| self.classify(bucket, key, err))
    }

    fn classify(&self, bucket: &str, key: &str, err: std::io::Error) -> StoreError {
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: err.to_string(),
            },
            _ => StoreError::Transient {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<u64> {
        let object = Self::payload_path(self.object_path(bucket, key)?).await;
        if let Err(err) = fs::metadata(&object).await {
            return Err(self.classify(bucket, key, err));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::local(parent, source))?;
        }
        let bytes = fs::copy(&object, destination)
            .await
            .map_err(|source| StoreError::local(destination, source))?;
        debug!(bucket, key, bytes, "fetched object from filesystem store");
        Ok(bytes)
    }

    async fn put(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()> {
        let object = self.object_path(bucket, key)?;
        self.prepare_parents(bucket, key, &object).await?;
        let object = Self::payload_path(object).await;
        fs::copy(source, &object).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::local(source, err)
            } else {
                self.classify(bucket, key, err)
            }
        })?;
        debug!(bucket, key, "stored object in filesystem store");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let object = Self::payload_path(self.object_path(bucket, key)?).await;
        fs::remove_file(&object)
            .await
            .map_err(|err| self.classify(bucket, key, err))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(key).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let temp = tempdir().unwrap();
        let store = FsObjectStore::new(temp.path().join("objects"));
        let source = temp.path().join("upload.m3u8");
        std::fs::write(&source, "#EXTM3U\n").unwrap();

        store.put("media", "clip.mp4/hls/master.m3u8", &source).await.unwrap();
        assert!(temp
            .path()
            .join("objects/media/clip.mp4/hls/master.m3u8")
            .exists());

        let destination = temp.path().join("download/master.m3u8");
        let bytes = store
            .get("media", "clip.mp4/hls/master.m3u8", &destination)
            .await
            .unwrap();
        assert_eq!(bytes, 8);

        store.delete("media", "clip.mp4/hls/master.m3u8").await.unwrap();
        let err = store
            .get("media", "clip.mp4/hls/master.m3u8", &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn key_can_be_object_and_prefix() {
        let temp = tempdir().unwrap();
        let store = FsObjectStore::new(temp.path());
        let source = temp.path().join("payload");
        std::fs::write(&source, "source").unwrap();

        store.put("media", "uploads/clip.mp4", &source).await.unwrap();
        store
            .put("media", "uploads/clip.mp4/hls/master.m3u8", &source)
            .await
            .unwrap();
        assert!(temp.path().join("media/uploads/clip.mp4/hls/master.m3u8").is_file());

        let destination = temp.path().join("fetched");
        store
            .get("media", "uploads/clip.mp4", &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "source");

        store.delete("media", "uploads/clip.mp4").await.unwrap();
        assert!(store
            .get("media", "uploads/clip.mp4", &destination)
            .await
            .is_err());
        assert!(store.object_path("media", "clip/.object").is_err());
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_bucket() {
        let temp = tempdir().unwrap();
        let store = FsObjectStore::new(temp.path());
        let err = store
            .get("media", "../secrets", &temp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert!(store.object_path("media", "/etc/passwd").is_err());
    }
}
