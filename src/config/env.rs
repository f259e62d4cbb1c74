use std::env;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub enum EnvKey {
    AmqpUrl,
    RenderQueue,
    ResponseQueue,
    ThumbnailQueue,
    DownloadQueue,
    TranscriptionQueue,
    S3Endpoint,
    S3Region,
    S3AccessKey,
    S3SecretKey,
    WorkDir,
    EncoderPath,
    FetchTimeoutSecs,
    EncodeTimeoutSecs,
    MaxConcurrentJobs,
    ExecutionPolicy,
    AckMode,
    HealthPort,
    LogFormat,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::RenderQueue => "RENDER_QUEUE",
            EnvKey::ResponseQueue => "RENDER_RESPONSE_QUEUE",
            EnvKey::ThumbnailQueue => "THUMBNAIL_QUEUE",
            EnvKey::DownloadQueue => "DOWNLOAD_QUEUE",
            EnvKey::TranscriptionQueue => "TRANSCRIPTION_QUEUE",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::S3AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::S3SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::EncoderPath => "ENCODER_PATH",
            EnvKey::FetchTimeoutSecs => "FETCH_TIMEOUT_SECS",
            EnvKey::EncodeTimeoutSecs => "ENCODE_TIMEOUT_SECS",
            EnvKey::MaxConcurrentJobs => "MAX_CONCURRENT_JOBS",
            EnvKey::ExecutionPolicy => "EXECUTION_POLICY",
            EnvKey::AckMode => "ACK_MODE",
            EnvKey::HealthPort => "HEALTH_PORT",
            EnvKey::LogFormat => "LOG_FORMAT",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, ConfigError> {
    get_opt(key).ok_or(ConfigError::Missing(key.as_str()))
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    get_opt(key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    parse_or(key, get_opt(key).as_deref(), default)
}

/// Parses `raw` for `key`, falling back to `default` (with a warning) when the
/// value is present but unparsable.
pub fn parse_or<T: FromStr>(key: EnvKey, raw: Option<&str>, default: T) -> T {
    match raw {
        Some(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key = key.as_str(), value = val, "Unparsable value, using default");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_uses_value_when_valid() {
        assert_eq!(parse_or(EnvKey::HealthPort, Some(" 9090 "), 8080u16), 9090);
    }

    #[test]
    fn parse_or_falls_back_on_garbage_or_absence() {
        assert_eq!(parse_or(EnvKey::HealthPort, Some("eighty"), 8080u16), 8080);
        assert_eq!(parse_or(EnvKey::MaxConcurrentJobs, None, 2usize), 2);
    }
}
