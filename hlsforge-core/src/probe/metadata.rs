use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ladder::SourceDimensions;

use super::{ProbeError, ProbeResult};

/// Subset of `ffprobe -print_format json -show_streams` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<StreamMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub rotation: Option<i32>,
    #[serde(default)]
    pub display_aspect_ratio: Option<String>,
    #[serde(default)]
    pub sample_aspect_ratio: Option<String>,
    #[serde(default)]
    pub side_data_list: Vec<SideData>,
    #[serde(default)]
    pub tags: StreamTags,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SideData {
    #[serde(default)]
    pub rotation: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamTags {
    #[serde(default)]
    pub rotate: Option<String>,
}

impl StreamMetadata {
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    /// Rotation in degrees; streams without rotation metadata report 0.
    pub fn rotation_degrees(&self) -> i32 {
        self.rotation
            .or_else(|| self.side_data_list.iter().find_map(|entry| entry.rotation))
            .or_else(|| {
                self.tags
                    .rotate
                    .as_deref()
                    .and_then(|value| value.trim().parse().ok())
            })
            .unwrap_or(0)
    }
}

/// Normalized view of the first video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: i32,
    pub display_aspect_ratio: Option<String>,
    pub sample_aspect_ratio: Option<String>,
}

impl VideoMetadata {
    pub fn dimensions(&self) -> SourceDimensions {
        SourceDimensions::new(self.width, self.height)
    }
}

/// Coded size as it is shown: a quarter turn either way swaps the axes.
pub fn displayed_dimensions(width: u32, height: u32, rotation: i32) -> SourceDimensions {
    if rotation == 90 || rotation == -90 {
        SourceDimensions::new(height, width)
    } else {
        SourceDimensions::new(width, height)
    }
}

/// Picks the first video stream and applies rotation correction.
pub fn normalize(output: &ProbeOutput) -> ProbeResult<VideoMetadata> {
    let stream = output
        .streams
        .iter()
        .find(|stream| stream.is_video())
        .ok_or(ProbeError::NoVideoStream)?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => (width, height),
        (width, height) => {
            return Err(ProbeError::InvalidDimensions {
                width: width.unwrap_or(0),
                height: height.unwrap_or(0),
            })
        }
    };
    let rotation = stream.rotation_degrees();
    let displayed = displayed_dimensions(width, height, rotation);
    let metadata = VideoMetadata {
        width: displayed.width,
        height: displayed.height,
        rotation,
        display_aspect_ratio: stream.display_aspect_ratio.clone(),
        sample_aspect_ratio: stream.sample_aspect_ratio.clone(),
    };
    debug!(?metadata, "normalized video metadata");
    Ok(metadata)
}
