use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::error::{PipelineError, PipelineResult};

/// Local scratch space owned by one job. The source lives outside the
/// output tree so it is never published.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    pub job_id: String,
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl JobWorkspace {
    pub fn new(work_dir: &Path, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        let root = work_dir.join(&job_id);
        Self {
            source_dir: root.join("source"),
            output_dir: root.join("output"),
            root,
            job_id,
        }
    }

    pub async fn create(work_dir: &Path) -> PipelineResult<Self> {
        let workspace = Self::new(work_dir, Uuid::new_v4().to_string());
        for dir in [&workspace.source_dir, &workspace.output_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| PipelineError::Io {
                    source,
                    path: dir.clone(),
                })?;
        }
        debug!(job_id = %workspace.job_id, root = %workspace.root.display(), "job workspace ready");
        Ok(workspace)
    }

    /// Where the downloaded source is kept; named after the key's last
    /// segment so ffmpeg can sniff the container from the extension.
    pub fn source_file(&self, source_key: &str) -> PathBuf {
        let name = source_key
            .rsplit('/')
            .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .unwrap_or("source");
        self.source_dir.join(name)
    }

    /// Purges the whole job directory on the blocking pool.
    pub async fn purge(&self) -> CleanupReport {
        let root = self.root.clone();
        match tokio::task::spawn_blocking(move || purge_directory(&root)).await {
            Ok(report) => report,
            Err(err) => {
                warn!(path = %self.root.display(), error = %err, "cleanup task did not finish");
                CleanupReport {
                    failures: vec![(self.root.clone(), std::io::Error::other(err))],
                    ..CleanupReport::default()
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub failures: Vec<(PathBuf, std::io::Error)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes `root` and everything below it, deepest entries first. Missing
/// paths are not an error, so calling this twice is harmless. Every failure
/// is logged and collected; the walk keeps going past them.
pub fn purge_directory(root: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    if !root.exists() {
        return report;
    }
    for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                warn!(path = %path.display(), error = %source, "failed to inspect path during cleanup");
                report.failures.push((path, source));
                continue;
            }
        };
        let path = entry.path();
        let removal = if entry.file_type().is_dir() {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };
        match removal {
            Ok(()) if entry.file_type().is_dir() => report.removed_dirs += 1,
            Ok(()) => report.removed_files += 1,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove path during cleanup");
                report.failures.push((path.to_path_buf(), err));
            }
        }
    }
    report
}
