use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::modules::render::RenderPipeline;
use crate::state::AppState;

/// Consumes the render queue until the consumer stream ends. Each delivery is
/// handled on its own task; at most `max_concurrent_jobs` run at once.
pub async fn start_render_worker(state: AppState, pipeline: Arc<RenderPipeline>) -> Result<()> {
    info!("Starting render worker...");

    let queue_name = state.config.queues.render.clone();
    let max_jobs = state.config.max_concurrent_jobs;
    let prefetch = u16::try_from(max_jobs).unwrap_or(u16::MAX);
    let consumer_tag = format!("render-worker-{}", Uuid::new_v4().simple());

    let mut consumer = state.queue.consume(&queue_name, &consumer_tag, prefetch).await?;
    let slots = Arc::new(Semaphore::new(max_jobs));

    info!(queue = %queue_name, max_jobs, "Render worker listening");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Render consumer failed: {}", e);
                return Err(anyhow!("Consumer for '{}' failed: {}", queue_name, e));
            }
        };

        let permit = slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("Job slots closed: {}", e))?;
        let pipeline = pipeline.clone();

        info!(
            size = delivery.data.len(),
            redelivered = delivery.redelivered,
            "Received render job"
        );

        tokio::spawn(async move {
            pipeline.handle(&delivery.data, &delivery).await;
            drop(permit);
        });
    }

    warn!(queue = %queue_name, "Render consumer stream ended");
    Err(anyhow!("Consumer for '{}' closed", queue_name))
}
