mod params;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::exec::{describe, run_with_limit, tail_lines, CommandExecutor};
use crate::ladder::{RenditionDescriptor, Tier};

pub use params::{
    AudioParameters, EncodeParameters, Preset, SegmentParameters, VideoParameters,
    ASSUMED_FRAME_RATE, CAPPED_FRAME_RATE, INDEX_PLAYLIST, SEGMENT_DURATION_SECS,
    SEGMENT_FILENAME,
};

#[derive(Debug, Error)]
#[error("encoding {tier} rendition failed: {details}")]
pub struct EncodeError {
    pub tier: Tier,
    pub details: String,
}

impl EncodeError {
    fn new(tier: Tier, details: impl Into<String>) -> Self {
        Self {
            tier,
            details: details.into(),
        }
    }
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Files produced for one rendition.
#[derive(Debug, Clone)]
pub struct RenditionOutput {
    pub rendition: RenditionDescriptor,
    pub directory: PathBuf,
    pub playlist: PathBuf,
    pub segments: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Drives ffmpeg to produce one HLS rendition per call.
#[derive(Clone)]
pub struct RenditionEncoder {
    ffmpeg: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for RenditionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenditionEncoder")
            .field("ffmpeg", &self.ffmpeg)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RenditionEncoder {
    pub fn new(ffmpeg: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            ffmpeg,
            executor,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encodes `input` into `output_root/<tier>/`.
    pub async fn encode(
        &self,
        input: &Path,
        output_root: &Path,
        rendition: &RenditionDescriptor,
    ) -> EncodeResult<RenditionOutput> {
        let tier = rendition.name;
        let directory = output_root.join(tier.as_str());
        fs::create_dir_all(&directory).await.map_err(|err| {
            EncodeError::new(
                tier,
                format!("cannot create {}: {err}", directory.display()),
            )
        })?;

        let params = EncodeParameters::for_rendition(rendition);
        let mut command = Command::new(&self.ffmpeg);
        command.args(params.to_args(input, &directory));
        debug!(%tier, command = %describe(&command), "spawning ffmpeg");
        info!(
            %tier,
            width = rendition.width,
            height = rendition.height,
            bitrate_kbps = rendition.bitrate_kbps,
            "encoding rendition"
        );

        let started = Instant::now();
        let output = run_with_limit(self.executor.as_ref(), &mut command, self.timeout)
            .await
            .map_err(|err| EncodeError::new(tier, format!("ffmpeg did not complete: {err}")))?;
        if !output.status.success() {
            let stderr = tail_lines(&output.stderr, 20);
            error!(%tier, status = ?output.status.code(), %stderr, "ffmpeg failed");
            return Err(EncodeError::new(
                tier,
                format!("ffmpeg exited with status {:?}: {stderr}", output.status.code()),
            ));
        }

        let playlist = directory.join(INDEX_PLAYLIST);
        if fs::metadata(&playlist).await.is_err() {
            return Err(EncodeError::new(
                tier,
                format!("ffmpeg finished without writing {}", playlist.display()),
            ));
        }
        let segments = list_segments(&directory)
            .await
            .map_err(|err| EncodeError::new(tier, format!("cannot list segments: {err}")))?;
        let elapsed = started.elapsed();
        info!(
            %tier,
            segments = segments.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "rendition complete"
        );
        Ok(RenditionOutput {
            rendition: *rendition,
            directory,
            playlist,
            segments,
            elapsed,
        })
    }
}

async fn list_segments(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(directory).await?;
    let mut segments = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_segment = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("segment_") || name == "init.mp4")
            .unwrap_or(false);
        if is_segment {
            segments.push(path);
        }
    }
    segments.sort();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedFfmpeg {
        exit_code: i32,
        write_playlist: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CommandExecutor for ScriptedFfmpeg {
        async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
            let args: Vec<PathBuf> = command.as_std().get_args().map(PathBuf::from).collect();
            self.calls.lock().unwrap().push(describe(command));
            if self.write_playlist {
                let playlist = args.last().unwrap();
                let directory = playlist.parent().unwrap();
                std::fs::write(playlist, "#EXTM3U\n").unwrap();
                std::fs::write(directory.join("segment_000.m4s"), b"seg").unwrap();
                std::fs::write(directory.join("segment_001.m4s"), b"seg").unwrap();
            }
            Ok(std::process::Output {
                status: std::process::ExitStatus::from_raw(self.exit_code << 8),
                stdout: Vec::new(),
                stderr: b"frame=1\nConversion failed!\n".to_vec(),
            })
        }
    }

    fn rendition() -> RenditionDescriptor {
        RenditionDescriptor {
            name: Tier::Lower,
            width: 640,
            height: 360,
            bitrate_kbps: 200,
        }
    }

    fn encoder(exit_code: i32, write_playlist: bool) -> (RenditionEncoder, Arc<ScriptedFfmpeg>) {
        let executor = Arc::new(ScriptedFfmpeg {
            exit_code,
            write_playlist,
            calls: Mutex::new(Vec::new()),
        });
        let encoder = RenditionEncoder::new(PathBuf::from("ffmpeg"), executor.clone());
        (encoder, executor)
    }

    #[tokio::test]
    async fn writes_rendition_into_tier_directory() {
        let temp = tempdir().unwrap();
        let (encoder, executor) = encoder(0, true);
        let output = encoder
            .encode(&temp.path().join("input.mp4"), temp.path(), &rendition())
            .await
            .unwrap();
        assert_eq!(output.directory, temp.path().join("lower"));
        assert!(output.playlist.ends_with("lower/index.m3u8"));
        assert_eq!(output.segments.len(), 2);
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("ffmpeg -y"));
    }

    #[tokio::test]
    async fn non_zero_exit_reports_tier_and_stderr() {
        let temp = tempdir().unwrap();
        let (encoder, _) = encoder(1, false);
        let err = encoder
            .encode(&temp.path().join("input.mp4"), temp.path(), &rendition())
            .await
            .unwrap_err();
        assert_eq!(err.tier, Tier::Lower);
        assert!(err.details.contains("Conversion failed!"));
    }

    struct HangingFfmpeg;

    #[async_trait::async_trait]
    impl CommandExecutor for HangingFfmpeg {
        async fn run(&self, _command: &mut Command) -> std::io::Result<std::process::Output> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(std::io::Error::other("ffmpeg never returned"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_encode_reports_its_tier() {
        let temp = tempdir().unwrap();
        let encoder = RenditionEncoder::new(PathBuf::from("ffmpeg"), Arc::new(HangingFfmpeg))
            .with_timeout(Some(Duration::from_secs(30)));
        let err = encoder
            .encode(&temp.path().join("input.mp4"), temp.path(), &rendition())
            .await
            .unwrap_err();
        assert_eq!(err.tier, Tier::Lower);
        assert!(err.details.contains("did not complete"));
        assert!(err.details.contains("exceeded 30s"));
    }

    #[tokio::test]
    async fn clean_exit_without_playlist_fails() {
        let temp = tempdir().unwrap();
        let (encoder, _) = encoder(0, false);
        let err = encoder
            .encode(&temp.path().join("input.mp4"), temp.path(), &rendition())
            .await
            .unwrap_err();
        assert!(err.details.contains("without writing"));
    }
}
