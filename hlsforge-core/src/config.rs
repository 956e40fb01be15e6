use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HlsforgeConfig {
    pub paths: PathsSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub encoder: EncoderSection,
    pub store: StoreSection,
}

impl HlsforgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store.upload_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "store.upload_concurrency",
                reason: "must be greater than zero".into(),
            });
        }
        if matches!(self.store.kind, StoreKind::Filesystem) && self.store.root.is_none() {
            return Err(ConfigError::Invalid {
                field: "store.root",
                reason: "required when store.kind = \"filesystem\"".into(),
            });
        }
        if self.encoder.timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid {
                field: "encoder.timeout_seconds",
                reason: "must be greater than zero when set".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncoderSection {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl EncoderSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    S3,
    Filesystem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    pub kind: StoreKind,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    #[serde(default)]
    pub delete_source_on_success: bool,
}

fn default_upload_concurrency() -> usize {
    8
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HlsforgeConfig> {
    let config: HlsforgeConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
