use async_trait::async_trait;

#[cfg(test)]
pub mod memory;
pub mod rabbitmq;

/// Sends a payload to a named queue.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// Acknowledges one inbound delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> anyhow::Result<()>;
}
