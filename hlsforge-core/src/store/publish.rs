use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{ObjectStore, StoreError, StoreResult};

#[derive(Debug)]
pub struct PublishFailure {
    pub key: String,
    pub error: StoreError,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub uploaded: Vec<String>,
    pub failures: Vec<PublishFailure>,
}

impl PublishReport {
    pub fn into_result(mut self) -> StoreResult<Vec<String>> {
        if self.failures.is_empty() {
            self.uploaded.sort();
            return Ok(self.uploaded);
        }
        let total = self.uploaded.len() + self.failures.len();
        let failed = self.failures.len();
        let first = self.failures.swap_remove(0);
        Err(StoreError::Publish {
            failed,
            total,
            first: Box::new(first.error),
        })
    }
}

/// Lists the files under `root` paired with their `prefix/<relative path>`
/// object keys. Keys always use `/` separators.
pub fn collect_uploads(root: &Path, prefix: &str) -> StoreResult<Vec<(PathBuf, String)>> {
    let prefix = prefix.trim_end_matches('/');
    let mut uploads = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            StoreError::local(&path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| StoreError::local(entry.path(), std::io::Error::other(err)))?;
        let suffix: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().to_string())
            .collect();
        let key = if prefix.is_empty() {
            suffix.join("/")
        } else {
            format!("{prefix}/{}", suffix.join("/"))
        };
        uploads.push((entry.path().to_path_buf(), key));
    }
    Ok(uploads)
}

/// Uploads every file below `root` to `bucket` under `prefix`, running up to
/// `concurrency` transfers at once. Each file's outcome is recorded; the
/// report is complete even when some uploads fail.
pub async fn publish_tree(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    root: &Path,
    concurrency: usize,
) -> StoreResult<PublishReport> {
    let walk_root = root.to_path_buf();
    let walk_prefix = prefix.to_string();
    let uploads = tokio::task::spawn_blocking(move || collect_uploads(&walk_root, &walk_prefix))
        .await
        .map_err(|err| StoreError::local(root, std::io::Error::other(err)))??;
    let total = uploads.len();
    let outcomes: Vec<(String, StoreResult<()>)> = stream::iter(uploads)
        .map(|(path, key)| async move {
            let result = store.put(bucket, &key, &path).await;
            (key, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = PublishReport::default();
    for (key, result) in outcomes {
        match result {
            Ok(()) => report.uploaded.push(key),
            Err(error) => {
                warn!(bucket, key = %key, %error, "upload failed");
                report.failures.push(PublishFailure { key, error });
            }
        }
    }
    info!(
        bucket,
        prefix,
        uploaded = report.uploaded.len(),
        failed = report.failures.len(),
        total,
        "published output tree"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsObjectStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn sample_tree(root: &Path) {
        std::fs::create_dir_all(root.join("low")).unwrap();
        std::fs::create_dir_all(root.join("lower")).unwrap();
        std::fs::write(root.join("master.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(root.join("low/index.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(root.join("low/segment_000.m4s"), b"a").unwrap();
        std::fs::write(root.join("lower/index.m3u8"), "#EXTM3U\n").unwrap();
    }

    #[test]
    fn keys_preserve_relative_paths() {
        let temp = tempdir().unwrap();
        sample_tree(temp.path());
        let keys: Vec<String> = collect_uploads(temp.path(), "videos/clip.mp4/hls/")
            .unwrap()
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "videos/clip.mp4/hls/low/index.m3u8",
                "videos/clip.mp4/hls/low/segment_000.m4s",
                "videos/clip.mp4/hls/lower/index.m3u8",
                "videos/clip.mp4/hls/master.m3u8",
            ]
        );
    }

    #[tokio::test]
    async fn uploads_whole_tree() {
        let temp = tempdir().unwrap();
        let output = temp.path().join("output");
        sample_tree(&output);
        let store = FsObjectStore::new(temp.path().join("objects"));
        let uploaded = publish_tree(&store, "media", "clip/hls", &output, 2)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(uploaded.len(), 4);
        assert!(temp
            .path()
            .join("objects/media/clip/hls/low/segment_000.m4s")
            .exists());
    }

    struct RejectSegments(FsObjectStore);

    #[async_trait]
    impl ObjectStore for RejectSegments {
        async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<u64> {
            self.0.get(bucket, key, destination).await
        }

        async fn put(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()> {
            if key.ends_with(".m4s") {
                return Err(StoreError::Transient {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    detail: "connection reset".into(),
                });
            }
            self.0.put(bucket, key, source).await
        }

        async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
            self.0.delete(bucket, key).await
        }

        fn object_url(&self, bucket: &str, key: &str) -> String {
            self.0.object_url(bucket, key)
        }
    }

    #[tokio::test]
    async fn failed_uploads_are_reported_per_file() {
        let temp = tempdir().unwrap();
        let output = temp.path().join("output");
        sample_tree(&output);
        let store = RejectSegments(FsObjectStore::new(temp.path().join("objects")));
        let report = publish_tree(&store, "media", "clip/hls", &output, 4)
            .await
            .unwrap();
        assert_eq!(report.uploaded.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "clip/hls/low/segment_000.m4s");
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, StoreError::Publish { failed: 1, total: 4, .. }));
    }
}
