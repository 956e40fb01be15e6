mod error;
mod types;
mod workspace;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{HlsforgeConfig, StoreKind};
use crate::encoder::{RenditionEncoder, RenditionOutput};
use crate::exec::CommandExecutor;
use crate::ladder::{plan_ladder, RenditionLadder};
use crate::playlist::{write_master_playlists, MASTER_PLAYLIST_NAME};
use crate::probe::MediaProber;
use crate::store::{publish_tree, FsObjectStore, ObjectStore, S3ObjectStore, S3StoreConfig};

pub use error::{JobError, JobStage, PipelineError, PipelineResult};
pub use types::{JobOutcome, JobReport, JobRequest, PipelineSettings, OUTPUT_SUBDIRECTORY};
pub use workspace::{purge_directory, CleanupReport, JobWorkspace};

/// Runs one source object through staging, probing, planning, encoding,
/// assembly and publishing. Local scratch space is always purged.
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    prober: MediaProber,
    encoder: RenditionEncoder,
    settings: PipelineSettings,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("prober", &self.prober)
            .field("encoder", &self.encoder)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prober: MediaProber,
        encoder: RenditionEncoder,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            prober,
            encoder,
            settings,
        }
    }

    /// Wires a pipeline from configuration. S3 credentials come from the
    /// ambient AWS environment.
    pub async fn from_config(config: &HlsforgeConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let store: Arc<dyn ObjectStore> = match config.store.kind {
            StoreKind::S3 => Arc::new(
                S3ObjectStore::connect(&S3StoreConfig {
                    region: config.store.region.clone(),
                    endpoint: config.store.endpoint.clone(),
                    force_path_style: config.store.force_path_style,
                })
                .await,
            ),
            StoreKind::Filesystem => Arc::new(FsObjectStore::new(
                config.store.root.clone().unwrap_or_default(),
            )),
        };
        let timeout = config.encoder.timeout();
        let prober = MediaProber::new(config.tools.ffprobe.clone(), executor.clone())
            .with_timeout(timeout);
        let encoder =
            RenditionEncoder::new(config.tools.ffmpeg.clone(), executor).with_timeout(timeout);
        let settings = PipelineSettings {
            work_dir: config.paths.work_dir.clone(),
            public_base_url: config.store.public_base_url.clone(),
            upload_concurrency: config.store.upload_concurrency,
            delete_source_on_success: config.store.delete_source_on_success,
        };
        Self::new(store, prober, encoder, settings)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Processes the job and folds the result into a trigger response.
    pub async fn run(&self, request: &JobRequest) -> JobOutcome {
        match self.process(request).await {
            Ok(report) => JobOutcome::from(&report),
            Err(err) => JobOutcome::from(&err),
        }
    }

    pub async fn process(&self, request: &JobRequest) -> Result<JobReport, JobError> {
        request
            .validate()
            .map_err(|err| JobError::new(JobStage::Staging, err))?;
        let workspace = JobWorkspace::create(&self.settings.work_dir)
            .await
            .map_err(|err| JobError::new(JobStage::Staging, err))?;
        info!(
            job_id = %workspace.job_id,
            bucket = %request.source_bucket,
            key = %request.source_key,
            "job started"
        );

        let result = self.execute(request, &workspace).await;

        info!(job_id = %workspace.job_id, stage = %JobStage::Cleanup, "stage started");
        let cleanup = workspace.purge().await;
        settle(&workspace.job_id, result, &cleanup)
    }

    async fn execute(
        &self,
        request: &JobRequest,
        workspace: &JobWorkspace,
    ) -> Result<JobReport, JobError> {
        let job_id = workspace.job_id.as_str();
        let bucket = request.source_bucket.as_str();
        let key = request.source_key.as_str();

        enter(job_id, JobStage::Staging);
        let source = workspace.source_file(key);
        let bytes = self
            .store
            .get(bucket, key, &source)
            .await
            .map_err(|err| JobError::new(JobStage::Staging, err))?;
        info!(job_id, bytes, path = %source.display(), "source staged");

        enter(job_id, JobStage::Probing);
        let metadata = self
            .prober
            .inspect(&source)
            .await
            .map_err(|err| JobError::new(JobStage::Probing, err))?;

        enter(job_id, JobStage::Planning);
        let ladder = plan_ladder(metadata.dimensions())
            .map_err(|err| JobError::new(JobStage::Planning, err))?;
        info!(
            job_id,
            source = %metadata.dimensions(),
            rotation = metadata.rotation,
            "rendition ladder planned"
        );

        enter(job_id, JobStage::Encoding);
        let outputs = self
            .encode_all(&source, &workspace.output_dir, &ladder)
            .await
            .map_err(|err| JobError::new(JobStage::Encoding, err))?;
        info!(job_id, renditions = outputs.len(), "all renditions encoded");

        enter(job_id, JobStage::Assembling);
        write_master_playlists(&ladder, &workspace.output_dir)
            .map_err(|err| JobError::new(JobStage::Assembling, err))?;

        enter(job_id, JobStage::Publishing);
        let prefix = request.output_prefix();
        let published = publish_tree(
            self.store.as_ref(),
            bucket,
            &prefix,
            &workspace.output_dir,
            self.settings.upload_concurrency,
        )
        .await
        .and_then(|report| report.into_result())
        .map_err(|err| JobError::new(JobStage::Publishing, err))?;

        if self.settings.delete_source_on_success {
            match self.store.delete(bucket, key).await {
                Ok(()) => info!(job_id, bucket, key, "source object deleted"),
                Err(err) => warn!(job_id, bucket, key, error = %err, "failed to delete source object"),
            }
        }

        Ok(JobReport {
            job_id: job_id.to_string(),
            request: request.clone(),
            metadata,
            ladder,
            master_playlist_url: self.master_playlist_url(bucket, &prefix),
            published,
            completed_at: Utc::now(),
        })
    }

    /// Encodes every rendition concurrently. The first failure aborts the
    /// remaining encodes.
    async fn encode_all(
        &self,
        source: &Path,
        output_root: &Path,
        ladder: &RenditionLadder,
    ) -> PipelineResult<Vec<RenditionOutput>> {
        let mut tasks = JoinSet::new();
        for rendition in ladder {
            let encoder = self.encoder.clone();
            let source = source.to_path_buf();
            let output_root = output_root.to_path_buf();
            let rendition = *rendition;
            tasks.spawn(async move { encoder.encode(&source, &output_root, &rendition).await });
        }

        let mut outputs = Vec::with_capacity(ladder.renditions().len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome.map_err(PipelineError::from),
                Err(err) => Err(PipelineError::Worker(err.to_string())),
            };
            match outcome {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(err);
                }
            }
        }
        outputs.sort_by_key(|output| {
            ladder
                .iter()
                .position(|rendition| rendition.name == output.rendition.name)
        });
        Ok(outputs)
    }

    fn master_playlist_url(&self, bucket: &str, prefix: &str) -> String {
        match &self.settings.public_base_url {
            Some(base) => format!(
                "{}/{prefix}/{MASTER_PLAYLIST_NAME}",
                base.trim_end_matches('/')
            ),
            None => self
                .store
                .object_url(bucket, &format!("{prefix}/{MASTER_PLAYLIST_NAME}")),
        }
    }
}

/// Logs how the job ended. Cleanup trouble is reported alongside the job
/// result and never replaces it.
fn settle(
    job_id: &str,
    result: Result<JobReport, JobError>,
    cleanup: &CleanupReport,
) -> Result<JobReport, JobError> {
    if !cleanup.is_clean() {
        warn!(
            job_id,
            failures = cleanup.failures.len(),
            "cleanup left files behind"
        );
    }
    match &result {
        Ok(report) => info!(
            job_id,
            url = %report.master_playlist_url,
            objects = report.published.len(),
            "job complete"
        ),
        Err(err) => error!(
            job_id,
            state = %JobStage::Failed,
            stage = %err.stage,
            error = %err.source,
            "job failed"
        ),
    }
    result
}

fn enter(job_id: &str, stage: JobStage) {
    info!(job_id, %stage, "stage started");
}
