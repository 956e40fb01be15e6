pub mod config;
pub mod encoder;
pub mod error;
pub mod exec;
pub mod ladder;
pub mod pipeline;
pub mod playlist;
pub mod probe;
pub mod store;

pub use config::{
    load_config, EncoderSection, HlsforgeConfig, PathsSection, StoreKind, StoreSection,
    ToolsSection,
};
pub use encoder::{EncodeError, EncodeParameters, RenditionEncoder, RenditionOutput};
pub use error::{ConfigError, Result};
pub use exec::{CommandExecutor, SystemCommandExecutor};
pub use ladder::{
    plan_ladder, LadderError, LadderResult, RenditionDescriptor, RenditionLadder,
    SourceDimensions, Tier,
};
pub use pipeline::{
    JobError, JobOutcome, JobReport, JobRequest, JobStage, Pipeline, PipelineError,
    PipelineSettings,
};
pub use playlist::{write_master_playlists, AssemblyError, MasterPlaylists};
pub use probe::{MediaProber, ProbeError, VideoMetadata};
pub use store::{FsObjectStore, ObjectStore, S3ObjectStore, StoreError};
