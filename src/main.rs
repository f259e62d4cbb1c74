use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use render_worker::app;
use render_worker::config::env::{self, EnvKey};
use render_worker::config::settings::AppConfig;
use render_worker::infrastructure::queue::rabbitmq::RabbitMqService;
use render_worker::infrastructure::storage::ObjectStore;
use render_worker::infrastructure::storage::s3::S3Storage;
use render_worker::modules::render::RenderPipeline;
use render_worker::state::AppState;
use render_worker::workers;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::get_opt(EnvKey::LogFormat).is_some_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = AppConfig::new()?;
    info!("Starting render worker: {}", config);

    let queue = RabbitMqService::new(&config.amqp_url).await?;
    let storage: Arc<dyn ObjectStore> = Arc::new(S3Storage::new(&config.storage));
    let state = AppState::new(config.clone(), queue.clone());

    let pipeline = Arc::new(RenderPipeline::from_config(&config, storage, Arc::new(queue)));

    let app = app::create_app(state.clone()).await;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind health endpoint on {}: {}", addr, e))?;
    info!("Health endpoint on http://{}/health", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server stopped: {}", e);
        }
    });

    tokio::select! {
        result = workers::render::start_render_worker(state, pipeline) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}
