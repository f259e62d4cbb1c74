use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;

use super::{Acknowledge, MessagePublisher};

/// Records every published message; can be told to fail every send.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Every payload sent to `queue`, parsed as JSON.
    pub fn json_on(&self, queue: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| serde_json::from_slice(&payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, queue: &str, payload: &[u8]) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("channel closed"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((queue.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingAck {
    acks: AtomicUsize,
}

impl CountingAck {
    pub fn count(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acknowledge for CountingAck {
    async fn ack(&self) -> anyhow::Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
