use std::fmt::Display;
use std::io;

use serde::Serialize;
use thiserror::Error;

use super::model::{ObjectRef, Stage};
use crate::infrastructure::encoder::FfmpegError;

/// The inbound message could not be turned into a render job.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is neither JSON nor base64-encoded JSON: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a valid render job: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload field {0} is empty")]
    Empty(&'static str),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source object {bucket}/{path} does not exist")]
    NotFound { bucket: String, path: String },

    #[error("transfer of {bucket}/{path} was interrupted: {message}")]
    Interrupted {
        bucket: String,
        path: String,
        message: String,
    },

    #[error("transfer of {bucket}/{path} timed out after {seconds} seconds")]
    Timeout {
        bucket: String,
        path: String,
        seconds: u64,
    },

    #[error("could not prepare working storage: {0}")]
    Workspace(#[source] io::Error),
}

impl FetchError {
    pub fn not_found(source: &ObjectRef) -> Self {
        Self::NotFound {
            bucket: source.bucket.clone(),
            path: source.path.clone(),
        }
    }

    pub fn interrupted(source: &ObjectRef, cause: impl Display) -> Self {
        Self::Interrupted {
            bucket: source.bucket.clone(),
            path: source.path.clone(),
            message: cause.to_string(),
        }
    }

    pub fn timeout(source: &ObjectRef, seconds: u64) -> Self {
        Self::Timeout {
            bucket: source.bucket.clone(),
            path: source.path.clone(),
            seconds,
        }
    }
}

/// A transcode operation failed; `stage` says which one.
#[derive(Debug, Error)]
#[error("{stage} failed: {message}")]
pub struct EncodeError {
    pub stage: Stage,
    pub message: String,
    pub exit_code: Option<i32>,
}

impl EncodeError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn from_ffmpeg(stage: Stage, err: FfmpegError) -> Self {
        Self {
            stage,
            exit_code: err.exit_code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl JobError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            JobError::Fetch(_) => None,
            JobError::Encode(e) => Some(e.stage),
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        match self {
            JobError::Fetch(e) => ErrorDetail {
                kind: "fetch",
                stage: None,
                message: e.to_string(),
                exit_code: None,
            },
            JobError::Encode(e) => ErrorDetail {
                kind: "encode",
                stage: Some(e.stage),
                message: e.message.clone(),
                exit_code: e.exit_code,
            },
        }
    }
}

/// Wire form of a job failure, carried in the response's `error` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("response channel send failed: {0:#}")]
    Send(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_detail_is_tagged_with_stage() {
        let err = JobError::from(EncodeError::from_ffmpeg(
            Stage::VideoFormatB,
            FfmpegError::Exited {
                code: Some(1),
                diagnostic: "Unknown encoder 'libvpx'".into(),
            },
        ));
        let json = serde_json::to_value(err.detail()).unwrap();
        assert_eq!(json["kind"], "encode");
        assert_eq!(json["stage"], "video-format-B");
        assert_eq!(json["exitCode"], 1);
        assert!(json["message"].as_str().unwrap().contains("libvpx"));
    }

    #[test]
    fn fetch_detail_has_no_stage() {
        let err = JobError::from(FetchError::not_found(&ObjectRef::new("b", "a.mov")));
        let json = serde_json::to_value(err.detail()).unwrap();
        assert_eq!(json["kind"], "fetch");
        assert!(json.get("stage").is_none());
        assert_eq!(json["message"], "source object b/a.mov does not exist");
    }
}
