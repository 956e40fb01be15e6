use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{JobError, JobStage, PipelineError};
use crate::ladder::RenditionLadder;
use crate::probe::VideoMetadata;

/// Prefix under the source key where the HLS package is published.
pub const OUTPUT_SUBDIRECTORY: &str = "hls";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub source_bucket: String,
    pub source_key: String,
}

impl JobRequest {
    pub fn new(source_bucket: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
        }
    }

    /// Parses `s3://bucket/key`.
    pub fn from_url(url: &str) -> Result<Self, PipelineError> {
        let rest = url
            .strip_prefix("s3://")
            .ok_or_else(|| PipelineError::InvalidInput(format!("{url} is not an s3:// url")))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| PipelineError::InvalidInput(format!("{url} has no object key")))?;
        let request = Self::new(bucket, key);
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source_bucket.trim().is_empty() {
            return Err(PipelineError::InvalidInput("source bucket is empty".into()));
        }
        let key = self.source_key.trim();
        if key.is_empty() {
            return Err(PipelineError::InvalidInput("source key is empty".into()));
        }
        if key.ends_with('/') {
            return Err(PipelineError::InvalidInput(format!(
                "source key {key} names a prefix, not an object"
            )));
        }
        Ok(())
    }

    /// Object prefix receiving the output tree.
    pub fn output_prefix(&self) -> String {
        format!("{}/{OUTPUT_SUBDIRECTORY}", self.source_key)
    }
}

/// Job-level knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub upload_concurrency: usize,
    pub delete_source_on_success: bool,
}

impl PipelineSettings {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            public_base_url: None,
            upload_concurrency: 8,
            delete_source_on_success: false,
        }
    }
}

/// Everything a successful job produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub request: JobRequest,
    pub metadata: VideoMetadata,
    pub ladder: RenditionLadder,
    pub master_playlist_url: String,
    pub published: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Response shape returned to whoever triggered the job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_playlist_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JobStage>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<&JobReport> for JobOutcome {
    fn from(report: &JobReport) -> Self {
        Self {
            status_code: 200,
            message: "Video processing completed successfully".into(),
            master_playlist_url: Some(report.master_playlist_url.clone()),
            error: None,
            stage: None,
        }
    }
}

impl From<&JobError> for JobOutcome {
    fn from(err: &JobError) -> Self {
        Self {
            status_code: err.status_code(),
            message: "Error processing video".into(),
            master_playlist_url: None,
            error: Some(err.source.to_string()),
            stage: Some(err.stage),
        }
    }
}
