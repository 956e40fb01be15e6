use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use hlsforge_core::probe::displayed_dimensions;
use hlsforge_core::{
    load_config, plan_ladder, HlsforgeConfig, JobOutcome, JobRequest, LadderError, MediaProber,
    Pipeline, ProbeError, RenditionLadder, StoreKind, SystemCommandExecutor, VideoMetadata,
};

pub const BUCKET_ENV: &str = "HLSFORGE_BUCKET";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] hlsforge_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("ladder error: {0}")]
    Ladder(#[from] LadderError),
    #[error("no bucket given: pass --bucket, set store.bucket or export {BUCKET_ENV}")]
    MissingBucket,
    #[error("job failed with status {status_code}: {message}")]
    JobFailed { status_code: u16, message: String },
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "HLS rendition ladder transcoder", long_about = None)]
pub struct Cli {
    /// Path to hlsforge.toml
    #[arg(long, default_value = "configs/hlsforge.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcode one source object into an HLS package
    Process(ProcessArgs),
    /// Show the rendition ladder for a source resolution
    Plan(PlanArgs),
    /// Probe a local file and show its ladder
    Probe(ProbeArgs),
    /// Check tools, directories and store settings
    Health,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Object key of the source video
    #[arg(long)]
    pub key: String,
    /// Bucket holding the source (overrides store.bucket)
    #[arg(long)]
    pub bucket: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[arg(long)]
    pub width: u32,
    #[arg(long)]
    pub height: u32,
    /// Rotation metadata in degrees
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rotation: i32,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    pub file: PathBuf,
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Plan(args) => {
            let ladder = plan(args)?;
            render(&ladder, cli.format)?;
        }
        Commands::Process(args) => {
            let config = load_config(&cli.config)?;
            let bucket = resolve_bucket(
                args.bucket.as_deref(),
                &config,
                std::env::var(BUCKET_ENV).ok(),
            )
            .ok_or(AppError::MissingBucket)?;
            info!(bucket = %bucket, key = %args.key, store = ?config.store.kind, "processing source object");
            let pipeline = Pipeline::from_config(&config, Arc::new(SystemCommandExecutor)).await;
            let outcome = pipeline.run(&JobRequest::new(bucket, &args.key)).await;
            render(&outcome, cli.format)?;
            if !outcome.is_success() {
                warn!(status_code = outcome.status_code, key = %args.key, "job did not succeed");
                return Err(AppError::JobFailed {
                    status_code: outcome.status_code,
                    message: outcome.error.unwrap_or(outcome.message),
                });
            }
        }
        Commands::Probe(args) => {
            let config = load_config(&cli.config)?;
            let executor = Arc::new(SystemCommandExecutor);
            let prober = MediaProber::new(config.tools.ffprobe.clone(), executor)
                .with_timeout(config.encoder.timeout());
            let metadata = prober.inspect(&args.file).await?;
            let ladder = plan_ladder(metadata.dimensions())?;
            render(&ProbeReport { metadata, ladder }, cli.format)?;
        }
        Commands::Health => {
            let report = health_check(&cli.config);
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn plan(args: &PlanArgs) -> Result<RenditionLadder> {
    let source = displayed_dimensions(args.width, args.height, args.rotation);
    Ok(plan_ladder(source)?)
}

/// Flag first, then configuration, then the environment.
fn resolve_bucket(
    flag: Option<&str>,
    config: &HlsforgeConfig,
    env: Option<String>,
) -> Option<String> {
    flag.map(str::to_string)
        .or_else(|| config.store.bucket.clone())
        .or(env)
        .filter(|bucket| !bucket.trim().is_empty())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RenditionLadder {
    fn display(&self) -> String {
        self.iter()
            .map(|rendition| {
                format!(
                    "{name:<10} {resolution:>10} {bitrate:>6} kbps",
                    name = rendition.name.as_str(),
                    resolution = format!("{}x{}", rendition.width, rendition.height),
                    bitrate = rendition.bitrate_kbps
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for JobOutcome {
    fn display(&self) -> String {
        let mut lines = vec![format!("[{}] {}", self.status_code, self.message)];
        if let Some(url) = &self.master_playlist_url {
            lines.push(format!("master playlist: {url}"));
        }
        if let Some(stage) = &self.stage {
            lines.push(format!("failed stage: {stage}"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("error: {error}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub metadata: VideoMetadata,
    pub ladder: RenditionLadder,
}

impl DisplayFallback for ProbeReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "source: {} (rotation {})",
            self.metadata.dimensions(),
            self.metadata.rotation
        )];
        if let Some(dar) = &self.metadata.display_aspect_ratio {
            lines.push(format!("display aspect ratio: {dar}"));
        }
        lines.push(self.ladder.display());
        lines.join("\n")
    }
}

fn health_check(config_path: &Path) -> Vec<HealthEntry> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            return vec![HealthEntry::error(
                "config",
                format!("{}: {err}", config_path.display()),
            )]
        }
    };
    let mut results = vec![HealthEntry::ok(
        "config",
        config_path.display().to_string(),
    )];
    results.push(check_tool("ffmpeg", &config.tools.ffmpeg));
    results.push(check_tool("ffprobe", &config.tools.ffprobe));
    results.push(check_directory("work_dir", &config.paths.work_dir));
    match config.store.kind {
        StoreKind::Filesystem => {
            let root = config.store.root.clone().unwrap_or_default();
            results.push(check_directory("store.root", &root));
        }
        StoreKind::S3 => {
            let bucket = resolve_bucket(None, &config, std::env::var(BUCKET_ENV).ok());
            results.push(match bucket {
                Some(bucket) => HealthEntry::ok("store.bucket", bucket),
                None => HealthEntry::warn("store.bucket", "not set; --bucket is required"),
            });
        }
    }
    results
}

fn check_tool(name: &str, binary: &Path) -> HealthEntry {
    let status = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => HealthEntry::ok(name, binary.display().to_string()),
        Ok(status) => HealthEntry::error(
            name,
            format!("{} -version exited with {status}", binary.display()),
        ),
        Err(err) => HealthEntry::error(name, format!("{}: {err}", binary.display())),
    }
}

fn check_directory(name: &str, path: &Path) -> HealthEntry {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => HealthEntry::ok(name, path.display().to_string()),
        Ok(_) => HealthEntry::error(name, format!("{} is not a directory", path.display())),
        Err(_) => HealthEntry::warn(
            name,
            format!("{} missing, will be created on demand", path.display()),
        ),
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(HealthEntry::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
