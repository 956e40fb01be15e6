use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::encoder::EncodeError;
use crate::ladder::{LadderError, Tier};
use crate::playlist::AssemblyError;
use crate::probe::ProbeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
    #[error("probe failed: {0}")]
    Probe(ProbeError),
    #[error("no video stream found in source")]
    NoVideoStream,
    #[error("invalid source dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("encoding {tier} rendition failed: {details}")]
    EncodeFailed { tier: Tier, details: String },
    #[error("encode worker stopped unexpectedly: {0}")]
    Worker(String),
    #[error("playlist assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl PipelineError {
    /// 400 for requests that can never succeed, 500 for everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidInput(_) => 400,
            _ => 500,
        }
    }
}

impl From<ProbeError> for PipelineError {
    fn from(error: ProbeError) -> Self {
        match error {
            ProbeError::NoVideoStream => PipelineError::NoVideoStream,
            ProbeError::InvalidDimensions { width, height } => {
                PipelineError::InvalidDimensions { width, height }
            }
            other => PipelineError::Probe(other),
        }
    }
}

impl From<LadderError> for PipelineError {
    fn from(error: LadderError) -> Self {
        match error {
            LadderError::InvalidDimensions { width, height } => {
                PipelineError::InvalidDimensions { width, height }
            }
            LadderError::DegenerateRendition {
                source_width,
                source_height,
                ..
            } => PipelineError::InvalidDimensions {
                width: source_width,
                height: source_height,
            },
        }
    }
}

impl From<EncodeError> for PipelineError {
    fn from(error: EncodeError) -> Self {
        PipelineError::EncodeFailed {
            tier: error.tier,
            details: error.details,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Staging,
    Probing,
    Planning,
    Encoding,
    Assembling,
    Publishing,
    Cleanup,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Staging => "staging",
            JobStage::Probing => "probing",
            JobStage::Planning => "planning",
            JobStage::Encoding => "encoding",
            JobStage::Assembling => "assembling",
            JobStage::Publishing => "publishing",
            JobStage::Cleanup => "cleanup",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline failure tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct JobError {
    pub stage: JobStage,
    #[source]
    pub source: PipelineError,
}

impl JobError {
    pub fn new(stage: JobStage, source: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.source.status_code()
    }
}
