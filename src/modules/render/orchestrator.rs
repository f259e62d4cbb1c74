use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{Instrument, error, info, info_span, warn};

use super::error::{EncodeError, FetchError, JobError};
use super::fetcher::{JobWorkspace, SourceFetcher};
use super::model::{ObjectRef, RenderResponse, Stage, StorageLink};
use super::operations::{SourceInput, Transcoder};
use super::payload::{self, RenderJob};
use super::publisher::ResponsePublisher;
use crate::config::settings::{AckMode, AppConfig, ExecutionPolicy};
use crate::infrastructure::encoder::FfmpegRunner;
use crate::infrastructure::queue::{Acknowledge, MessagePublisher};
use crate::infrastructure::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub policy: ExecutionPolicy,
    pub ack_mode: AckMode,
}

/// One planned transcode: which operation, and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub stage: Stage,
    pub destination: ObjectRef,
}

impl Step {
    /// The operations of a render job, in execution order.
    pub fn plan(source: &ObjectRef) -> Vec<Step> {
        [Stage::AudioExtract, Stage::VideoFormatA, Stage::VideoFormatB]
            .into_iter()
            .map(|stage| Step {
                stage,
                destination: source.derive(stage.variant()),
            })
            .collect()
    }
}

/// Handles render job messages end to end: decode, fetch, transcode, respond.
pub struct RenderPipeline {
    fetcher: SourceFetcher,
    transcoder: Transcoder,
    publisher: ResponsePublisher,
    settings: PipelineSettings,
}

impl RenderPipeline {
    pub fn new(
        fetcher: SourceFetcher,
        transcoder: Transcoder,
        publisher: ResponsePublisher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            publisher,
            settings,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        storage: Arc<dyn ObjectStore>,
        channel: Arc<dyn MessagePublisher>,
    ) -> Self {
        let ffmpeg = FfmpegRunner::new(&config.encoder_path).with_timeout(config.encode_timeout);

        Self::new(
            SourceFetcher::new(storage.clone(), config.fetch_timeout),
            Transcoder::new(storage, ffmpeg),
            ResponsePublisher::new(channel, config.queues.response.clone()),
            PipelineSettings {
                work_dir: config.work_dir.clone(),
                policy: config.execution_policy,
                ack_mode: config.ack_mode,
            },
        )
    }

    /// Processes one inbound message. Never fails: every outcome ends up
    /// either on the response queue or, for undecodable input, in the log.
    pub async fn handle(&self, data: &[u8], delivery: &dyn Acknowledge) {
        let job = match payload::decode(data) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, size = data.len(), "Dropping undecodable render job");
                acknowledge(delivery).await;
                return;
            }
        };

        let span = info_span!("render_job", video_id = %job.id());
        async {
            if self.settings.ack_mode == AckMode::BeforeWork {
                acknowledge(delivery).await;
            }

            let response = self.render(&job).await;
            self.publisher.publish(&response).await;

            if self.settings.ack_mode == AckMode::AfterWork {
                acknowledge(delivery).await;
            }
        }
        .instrument(span)
        .await
    }

    /// Runs a decoded job and turns the outcome into its terminal response.
    pub async fn render(&self, job: &RenderJob) -> RenderResponse {
        info!(bucket = %job.source().bucket, path = %job.source().path, "Render job started");

        match self.execute(job).await {
            Ok(links) => {
                info!(artifacts = links.len(), "Render job finished");
                RenderResponse::success(job, links)
            }
            Err(e) => {
                error!(stage = ?e.stage(), error = %e, "Render job failed");
                RenderResponse::failure(job, &e)
            }
        }
    }

    async fn execute(&self, job: &RenderJob) -> Result<Vec<StorageLink>, JobError> {
        let workspace =
            JobWorkspace::create(&self.settings.work_dir, job.id()).map_err(FetchError::Workspace)?;

        let result = self.execute_in(job, &workspace).await;

        if let Err(e) = workspace.close() {
            warn!(error = %e, "Failed to remove job workspace");
        }
        result
    }

    async fn execute_in(
        &self,
        job: &RenderJob,
        workspace: &JobWorkspace,
    ) -> Result<Vec<StorageLink>, JobError> {
        let source = job.source();
        let local = self.fetcher.fetch(source, workspace).await?;
        let steps = Step::plan(source);

        let links = self
            .run_plan(&steps, source, &local, workspace, job.id())
            .await?;
        Ok(links)
    }

    async fn run_plan(
        &self,
        steps: &[Step],
        source: &ObjectRef,
        local: &Path,
        workspace: &JobWorkspace,
        video_id: &str,
    ) -> Result<Vec<StorageLink>, EncodeError> {
        match self.settings.policy {
            ExecutionPolicy::Sequential => {
                let mut links = Vec::with_capacity(steps.len());
                for step in steps {
                    links.push(self.run_step(step, source, local, workspace, video_id).await?);
                }
                Ok(links)
            }
            ExecutionPolicy::Concurrent => {
                let outcomes = join_all(
                    steps
                        .iter()
                        .map(|step| self.run_step(step, source, local, workspace, video_id)),
                )
                .await;
                // First failure in plan order wins.
                outcomes.into_iter().collect()
            }
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        source: &ObjectRef,
        local: &Path,
        workspace: &JobWorkspace,
        video_id: &str,
    ) -> Result<StorageLink, EncodeError> {
        let input = match step.stage {
            Stage::AudioExtract => SourceInput::Local(local),
            Stage::VideoFormatA | Stage::VideoFormatB => SourceInput::Remote(source),
        };

        self.transcoder
            .run(step.stage, input, &step.destination, workspace)
            .await?;

        Ok(StorageLink::new(
            &step.destination,
            step.stage.variant(),
            video_id,
        ))
    }
}

async fn acknowledge(delivery: &dyn Acknowledge) {
    if let Err(e) = delivery.ack().await {
        error!(error = %e, "Failed to acknowledge render job");
    }
}
