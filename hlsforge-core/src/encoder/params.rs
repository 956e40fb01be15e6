use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::ladder::{RenditionDescriptor, Tier};

pub const SEGMENT_DURATION_SECS: u32 = 4;
pub const ASSUMED_FRAME_RATE: u32 = 30;
pub const CAPPED_FRAME_RATE: u32 = 24;
pub const SEGMENT_FILENAME: &str = "segment_%03d.m4s";
pub const INDEX_PLAYLIST: &str = "index.m3u8";

const X264_TUNING: &[&str] = &[
    "no-fast-pskip=1",
    "no-dct-decimate=1",
    "aq-mode=1",
    "aq-strength=0.8",
    "psy-rd=1.0",
    "deblock=1:1",
    "me=hex",
    "subme=7",
    "trellis=2",
    "ref=3",
    "b-adapt=2",
    "bframes=3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Veryfast,
    Medium,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Veryfast => f.write_str("veryfast"),
            Preset::Medium => f.write_str("medium"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoParameters {
    pub width: u32,
    pub height: u32,
    pub crf: u8,
    pub preset: Preset,
    pub gop_size: u32,
    pub keyint_min: u32,
    pub bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub frame_rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioParameters {
    pub bitrate_kbps: u32,
    pub channels: u8,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentParameters {
    pub duration_secs: u32,
}

/// Encoder settings for one rendition, kept as data until the ffmpeg
/// argument list is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodeParameters {
    pub tier: Tier,
    pub video: VideoParameters,
    pub audio: AudioParameters,
    pub segment: SegmentParameters,
}

impl EncodeParameters {
    pub fn for_rendition(rendition: &RenditionDescriptor) -> Self {
        let (crf, preset) = match rendition.name {
            Tier::Low => (18, Preset::Medium),
            Tier::Lower => (23, Preset::Veryfast),
            Tier::SuperLow => (25, Preset::Veryfast),
        };
        let audio_bitrate_kbps = match rendition.name {
            Tier::Low => 96,
            Tier::Lower => 64,
            Tier::SuperLow => 48,
        };
        let frame_rate = match rendition.name {
            Tier::Low => None,
            Tier::Lower | Tier::SuperLow => Some(CAPPED_FRAME_RATE),
        };
        let gop_size = SEGMENT_DURATION_SECS * ASSUMED_FRAME_RATE;
        let max_bitrate_kbps = (rendition.bitrate_kbps as f64 * 1.5).round() as u32;
        Self {
            tier: rendition.name,
            video: VideoParameters {
                width: rendition.width,
                height: rendition.height,
                crf,
                preset,
                gop_size,
                keyint_min: gop_size / 2,
                bitrate_kbps: rendition.bitrate_kbps,
                max_bitrate_kbps,
                buffer_size_kbps: max_bitrate_kbps * 2,
                frame_rate,
            },
            audio: AudioParameters {
                bitrate_kbps: audio_bitrate_kbps,
                channels: 2,
                sample_rate: 44_100,
            },
            segment: SegmentParameters {
                duration_secs: SEGMENT_DURATION_SECS,
            },
        }
    }

    fn video_filter(&self) -> String {
        let VideoParameters { width, height, .. } = self.video;
        format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:-1:-1:color=black,format=yuv420p"
        )
    }

    /// Serializes the parameter set into an ffmpeg argument list writing the
    /// rendition playlist to `output_dir/index.m3u8`.
    pub fn to_args(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_os_string());

        let video = &self.video;
        let audio = &self.audio;
        let video_filter = self.video_filter();
        let crf = video.crf.to_string();
        let preset = video.preset.to_string();
        let gop = video.gop_size.to_string();
        let keyint_min = video.keyint_min.to_string();
        let bitrate = format!("{}k", video.bitrate_kbps);
        let maxrate = format!("{}k", video.max_bitrate_kbps);
        let bufsize = format!("{}k", video.buffer_size_kbps);
        let audio_bitrate = format!("{}k", audio.bitrate_kbps);
        let channels = audio.channels.to_string();
        let sample_rate = audio.sample_rate.to_string();
        let hls_time = self.segment.duration_secs.to_string();
        let segment_pattern = output_dir.join(SEGMENT_FILENAME);
        let x264 = X264_TUNING.join(":");

        let mut push = |values: &[&str]| {
            args.extend(values.iter().map(OsString::from));
        };
        push(&["-vf", video_filter.as_str()]);
        push(&["-c:v", "libx264", "-crf", crf.as_str(), "-preset", preset.as_str()]);
        push(&["-g", gop.as_str(), "-keyint_min", keyint_min.as_str(), "-sc_threshold", "0"]);
        push(&["-b:v", bitrate.as_str(), "-maxrate", maxrate.as_str(), "-bufsize", bufsize.as_str()]);
        push(&["-c:a", "aac", "-b:a", audio_bitrate.as_str()]);
        push(&["-ac", channels.as_str(), "-ar", sample_rate.as_str()]);
        push(&["-movflags", "+faststart"]);
        push(&["-f", "hls", "-hls_time", hls_time.as_str(), "-hls_list_size", "0"]);
        push(&["-hls_segment_type", "fmp4", "-hls_playlist_type", "vod"]);
        push(&["-hls_flags", "independent_segments", "-pix_fmt", "yuv420p"]);
        push(&["-x264-params", x264.as_str()]);
        if let Some(rate) = video.frame_rate {
            let rate = rate.to_string();
            push(&["-r", rate.as_str()]);
        }
        args.push(OsString::from("-hls_segment_filename"));
        args.push(segment_pattern.into_os_string());
        args.push(output_dir.join(INDEX_PLAYLIST).into_os_string());
        args
    }
}
