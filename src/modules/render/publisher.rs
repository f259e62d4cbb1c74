use std::sync::Arc;

use tracing::{error, info};

use super::error::PublishError;
use super::model::RenderResponse;
use crate::infrastructure::queue::MessagePublisher;

/// Emits terminal job results on the fixed response queue.
#[derive(Clone)]
pub struct ResponsePublisher {
    channel: Arc<dyn MessagePublisher>,
    queue: String,
}

impl ResponsePublisher {
    pub fn new(channel: Arc<dyn MessagePublisher>, queue: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
        }
    }

    /// Best-effort: a failed send is logged and dropped, the inbound job has
    /// already been settled.
    pub async fn publish(&self, response: &RenderResponse) {
        match self.try_publish(response).await {
            Ok(()) => info!(
                queue = %self.queue,
                success = response.is_success(),
                "Published render response"
            ),
            Err(e) => error!(queue = %self.queue, error = %e, "Failed to publish render response"),
        }
    }

    pub async fn try_publish(&self, response: &RenderResponse) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(response)?;
        self.channel
            .publish(&self.queue, &payload)
            .await
            .map_err(PublishError::Send)
    }
}
