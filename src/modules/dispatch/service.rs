use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use url::Url;

use super::events::{ThumbnailJob, TranscriptionJob, VideoUpload};
use crate::config::settings::QueueNames;
use crate::infrastructure::queue::MessagePublisher;
use crate::modules::render::model::ObjectRef;
use crate::modules::render::payload;

/// Storage link version the transcriber reads from.
const AUDIO_VERSION: &str = "FLAC";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("upload {0} has no raw storage link")]
    MissingSource(String),

    #[error("thumbnail timestamp {0} is not a non-negative number of seconds")]
    InvalidTimestamp(f64),

    #[error("upload {0} has no FLAC audio rendition")]
    MissingAudio(String),

    #[error("submitted URL {0:?} is not an http(s) URL")]
    InvalidUrl(String),

    #[error("could not serialize job: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("job publish failed: {0:#}")]
    Send(anyhow::Error),
}

/// Publishes work for the background workers. Unlike render responses,
/// failures here go back to the caller.
#[derive(Clone)]
pub struct JobDispatcher {
    channel: Arc<dyn MessagePublisher>,
    queues: QueueNames,
}

impl JobDispatcher {
    pub fn new(channel: Arc<dyn MessagePublisher>, queues: QueueNames) -> Self {
        Self { channel, queues }
    }

    pub async fn publish_render_job(&self, upload: &VideoUpload) -> Result<(), DispatchError> {
        match &upload.raw_storage_link {
            Some(link) if !link.bucket.is_empty() && !link.path.is_empty() => {}
            _ => return Err(DispatchError::MissingSource(upload.id.clone())),
        }

        self.send(&self.queues.render, upload).await?;
        info!(video_id = %upload.id, queue = %self.queues.render, "Render job published");
        Ok(())
    }

    pub async fn publish_thumbnail_job(
        &self,
        upload: &VideoUpload,
        timestamp_secs: f64,
    ) -> Result<(), DispatchError> {
        if !timestamp_secs.is_finite() || timestamp_secs < 0.0 {
            return Err(DispatchError::InvalidTimestamp(timestamp_secs));
        }

        let job = ThumbnailJob {
            upload,
            timestamp: timestamp_secs,
        };
        self.send(&self.queues.thumbnail, &job).await?;
        info!(video_id = %upload.id, timestamp = timestamp_secs, "Thumbnail job published");
        Ok(())
    }

    pub async fn publish_download_job(&self, upload: &VideoUpload) -> Result<(), DispatchError> {
        let submitted = upload.submitted_url.clone().unwrap_or_default();
        match Url::parse(&submitted) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => return Err(DispatchError::InvalidUrl(submitted)),
        }

        self.send(&self.queues.download, upload).await?;
        info!(video_id = %upload.id, queue = %self.queues.download, "Download job published");
        Ok(())
    }

    /// Queues transcription of the upload's FLAC rendition, which the render
    /// worker produces.
    pub async fn publish_transcription_job(
        &self,
        upload: &VideoUpload,
    ) -> Result<(), DispatchError> {
        let audio = match upload.storage_link(AUDIO_VERSION) {
            Some(link) if !link.bucket.is_empty() && !link.path.is_empty() => {
                ObjectRef::new(link.bucket.clone(), link.path.clone())
            }
            _ => return Err(DispatchError::MissingAudio(upload.id.clone())),
        };

        let job = TranscriptionJob {
            upload,
            audio_storage_link: audio,
        };
        self.send(&self.queues.transcription, &job).await?;
        info!(
            video_id = %upload.id,
            queue = %self.queues.transcription,
            "Transcription job published"
        );
        Ok(())
    }

    async fn send<T>(&self, queue: &str, job: &T) -> Result<(), DispatchError>
    where
        T: serde::Serialize + Sync,
    {
        let body = payload::encode(job)?;
        self.channel
            .publish(queue, &body)
            .await
            .map_err(DispatchError::Send)
    }
}
