use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorDetail, JobError};
use super::payload::RenderJob;

/// A bucket plus an object path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub path: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Byte offset of the dot that starts the final extension, if the last
    /// path segment has one.
    fn extension_dot(&self) -> Option<usize> {
        let dot = self.path.rfind('.')?;
        let ext = &self.path[dot + 1..];
        (!ext.is_empty() && !ext.contains('/')).then_some(dot)
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension_dot().map(|dot| &self.path[dot + 1..])
    }

    /// The path with its final extension removed.
    pub fn stem(&self) -> &str {
        match self.extension_dot() {
            Some(dot) => &self.path[..dot],
            None => &self.path,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Where `variant` of this object lives: same bucket, extension swapped
    /// for the variant suffix.
    pub fn derive(&self, variant: Variant) -> ObjectRef {
        ObjectRef {
            bucket: self.bucket.clone(),
            path: format!("{}{}", self.stem(), variant.suffix()),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Which rendition of an upload a stored object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "RAW")]
    Raw,
    #[serde(rename = "MP4")]
    WebMp4,
    #[serde(rename = "WEBM")]
    WebWebm,
    #[serde(rename = "FLAC")]
    AudioFlac,
}

impl Variant {
    pub fn suffix(self) -> &'static str {
        match self {
            Variant::Raw => "",
            Variant::WebMp4 => "-web.mp4",
            Variant::WebWebm => "-web.webm",
            Variant::AudioFlac => ".flac",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Variant::Raw => "application/octet-stream",
            Variant::WebMp4 => "video/mp4",
            Variant::WebWebm => "video/webm",
            Variant::AudioFlac => "audio/flac",
        }
    }
}

/// One transcode operation of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    #[serde(rename = "audio-extract")]
    AudioExtract,
    #[serde(rename = "video-format-A")]
    VideoFormatA,
    #[serde(rename = "video-format-B")]
    VideoFormatB,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::AudioExtract => "audio-extract",
            Stage::VideoFormatA => "video-format-A",
            Stage::VideoFormatB => "video-format-B",
        }
    }

    pub fn variant(self) -> Variant {
        match self {
            Stage::AudioExtract => Variant::AudioFlac,
            Stage::VideoFormatA => Variant::WebMp4,
            Stage::VideoFormatB => Variant::WebWebm,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored rendition, as reported on the response channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLink {
    pub path: String,
    pub bucket: String,
    pub version: Variant,
    #[serde(rename = "videoID")]
    pub video_id: String,
}

impl StorageLink {
    pub fn new(object: &ObjectRef, version: Variant, video_id: &str) -> Self {
        Self {
            path: object.path.clone(),
            bucket: object.bucket.clone(),
            version,
            video_id: video_id.to_string(),
        }
    }
}

/// Terminal outcome of one render job. Exactly one of `error` and `result`
/// is set; `error` is omitted from the wire form on success.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub request_payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<StorageLink>>,
}

impl RenderResponse {
    pub fn success(job: &RenderJob, links: Vec<StorageLink>) -> Self {
        Self {
            request_payload: job.raw.clone(),
            error: None,
            result: Some(links),
        }
    }

    pub fn failure(job: &RenderJob, error: &JobError) -> Self {
        Self {
            request_payload: job.raw.clone(),
            error: Some(error.detail()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
