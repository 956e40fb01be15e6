mod metadata;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::exec::{describe, run_with_limit, tail_lines, CommandExecutor};

pub use metadata::{
    displayed_dimensions, normalize, ProbeOutput, SideData, StreamMetadata, StreamTags,
    VideoMetadata,
};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("probe of {path} exited with status {status:?}: {stderr}")]
    Failed {
        path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
    #[error("invalid ffprobe payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no video stream found")]
    NoVideoStream,
    #[error("video stream reports invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Inspects media files with ffprobe.
#[derive(Clone)]
pub struct MediaProber {
    ffprobe: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for MediaProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaProber")
            .field("ffprobe", &self.ffprobe)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MediaProber {
    pub fn new(ffprobe: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            ffprobe,
            executor,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn probe(&self, path: &Path) -> ProbeResult<ProbeOutput> {
        let mut command = Command::new(&self.ffprobe);
        command
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(path);
        let rendered = describe(&command);
        debug!(command = %rendered, "running ffprobe");
        let output = run_with_limit(self.executor.as_ref(), &mut command, self.timeout)
            .await
            .map_err(|source| ProbeError::Spawn {
                command: rendered,
                source,
            })?;
        if !output.status.success() {
            let stderr = tail_lines(&output.stderr, 20);
            warn!(path = %path.display(), %stderr, "ffprobe returned non-zero status");
            return Err(ProbeError::Failed {
                path: path.to_path_buf(),
                status: output.status.code(),
                stderr,
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Probes `path` and returns its rotation-corrected video metadata.
    pub async fn inspect(&self, path: &Path) -> ProbeResult<VideoMetadata> {
        let output = self.probe(path).await?;
        normalize(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    struct CannedProbe {
        code: i32,
        stdout: &'static str,
    }

    #[async_trait::async_trait]
    impl CommandExecutor for CannedProbe {
        async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
            let args: Vec<_> = command.as_std().get_args().collect();
            assert_eq!(args[..5], ["-v", "quiet", "-print_format", "json", "-show_streams"]);
            Ok(Output {
                status: ExitStatus::from_raw(self.code << 8),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: b"moov atom not found\n".to_vec(),
            })
        }
    }

    fn prober(code: i32, stdout: &'static str) -> MediaProber {
        MediaProber::new(PathBuf::from("ffprobe"), Arc::new(CannedProbe { code, stdout }))
    }

    #[tokio::test]
    async fn inspect_normalizes_rotated_stream() {
        let metadata = prober(
            0,
            r#"{"streams":[{"codec_type":"video","width":1920,"height":1080,"rotation":-90}]}"#,
        )
        .inspect(Path::new("clip.mov"))
        .await
        .unwrap();
        assert_eq!((metadata.width, metadata.height), (1080, 1920));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_with_stderr() {
        let err = prober(1, "")
            .probe(Path::new("broken.mp4"))
            .await
            .unwrap_err();
        match err {
            ProbeError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(1));
                assert!(stderr.contains("moov atom not found"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_output_is_a_parse_error() {
        let err = prober(0, "not json")
            .probe(Path::new("clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
    }
}
