use crate::config::settings::AppConfig;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub queue: RabbitMqService,
}

impl AppState {
    pub fn new(config: AppConfig, queue: RabbitMqService) -> Self {
        Self { config, queue }
    }
}
