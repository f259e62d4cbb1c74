use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::env::{self, ConfigError, EnvKey};

/// How the three transcode operations of one job are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPolicy {
    /// One after another, stopping at the first failure.
    #[default]
    Sequential,
    /// All at once; the first failure in plan order wins.
    Concurrent,
}

impl FromStr for ExecutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" | "parallel" => Ok(Self::Concurrent),
            other => Err(format!("unknown execution policy '{other}'")),
        }
    }
}

/// When the inbound job message is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Right after decoding, so slow encodes never trigger redelivery.
    #[default]
    BeforeWork,
    /// After the response has been published.
    AfterWork,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "before-work" | "early" => Ok(Self::BeforeWork),
            "after-work" | "late" => Ok(Self::AfterWork),
            other => Err(format!("unknown ack mode '{other}'")),
        }
    }
}

/// Upper bound on jobs in flight; the AMQP prefetch count is a `u16`.
const MAX_JOB_LIMIT: usize = u16::MAX as usize;

fn job_limit(requested: usize) -> usize {
    requested.clamp(1, MAX_JOB_LIMIT)
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct QueueNames {
    pub render: String,
    pub response: String,
    pub thumbnail: String,
    pub download: String,
    pub transcription: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub amqp_url: String,
    pub queues: QueueNames,
    pub storage: StorageConfig,
    pub work_dir: PathBuf,
    pub encoder_path: PathBuf,
    pub fetch_timeout: Duration,
    pub encode_timeout: Duration,
    pub max_concurrent_jobs: usize,
    pub execution_policy: ExecutionPolicy,
    pub ack_mode: AckMode,
    pub health_port: u16,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            amqp_url: env::get(EnvKey::AmqpUrl)?,
            queues: QueueNames {
                render: env::get_or(EnvKey::RenderQueue, "render_jobs"),
                response: env::get_or(EnvKey::ResponseQueue, "render_responses"),
                thumbnail: env::get_or(EnvKey::ThumbnailQueue, "thumbnail_jobs"),
                download: env::get_or(EnvKey::DownloadQueue, "download_jobs"),
                transcription: env::get_or(EnvKey::TranscriptionQueue, "transcription_jobs"),
            },
            storage: StorageConfig {
                endpoint: env::get(EnvKey::S3Endpoint)?,
                region: env::get_or(EnvKey::S3Region, "us-east-1"),
                access_key: env::get(EnvKey::S3AccessKey)?,
                secret_key: env::get(EnvKey::S3SecretKey)?,
            },
            work_dir: env::get_opt(EnvKey::WorkDir)
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            encoder_path: PathBuf::from(env::get_or(EnvKey::EncoderPath, "ffmpeg")),
            fetch_timeout: Duration::from_secs(env::get_parsed(EnvKey::FetchTimeoutSecs, 900)),
            encode_timeout: Duration::from_secs(env::get_parsed(EnvKey::EncodeTimeoutSecs, 3600)),
            max_concurrent_jobs: job_limit(env::get_parsed(EnvKey::MaxConcurrentJobs, 2usize)),
            execution_policy: env::get_parsed(EnvKey::ExecutionPolicy, ExecutionPolicy::default()),
            ack_mode: env::get_parsed(EnvKey::AckMode, AckMode::default()),
            health_port: env::get_parsed(EnvKey::HealthPort, 8080),
        })
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credentials and the AMQP URL (which may embed a password) stay out of logs.
        write!(
            f,
            "render_queue={} response_queue={} s3_endpoint={} ",
            self.queues.render,
            self.queues.response,
            self.storage.endpoint,
        )?;
        write!(
            f,
            "work_dir={} encoder={} policy={:?} ack={:?} max_jobs={}",
            self.work_dir.display(),
            self.encoder_path.display(),
            self.execution_policy,
            self.ack_mode,
            self.max_concurrent_jobs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_policy_parses_aliases() {
        assert_eq!("Sequential".parse(), Ok(ExecutionPolicy::Sequential));
        assert_eq!("parallel".parse(), Ok(ExecutionPolicy::Concurrent));
        assert!("fastest".parse::<ExecutionPolicy>().is_err());
    }

    #[test]
    fn job_limit_stays_within_prefetch_range() {
        assert_eq!(job_limit(0), 1);
        assert_eq!(job_limit(4), 4);
        assert_eq!(job_limit(usize::MAX), 65535);
    }

    #[test]
    fn ack_mode_accepts_dashes_and_underscores() {
        assert_eq!("after_work".parse(), Ok(AckMode::AfterWork));
        assert_eq!("BEFORE-WORK".parse(), Ok(AckMode::BeforeWork));
        assert!("never".parse::<AckMode>().is_err());
    }
}
