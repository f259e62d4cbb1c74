use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::modules::render::model::ObjectRef;

/// A user-submitted video as the backend knows it. Only the fields the
/// dispatcher checks are typed; everything else travels along untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpload {
    pub id: String,
    // Wire name as the upload records store it.
    #[serde(
        rename = "submitedUrl",
        alias = "submittedUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub submitted_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_storage_link: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_links: Vec<UploadStorageLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoUpload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted_url: None,
            raw_storage_link: None,
            storage_links: Vec::new(),
            extra: Map::new(),
        }
    }

    /// The rendition tagged `version`, if the upload has one.
    pub fn storage_link(&self, version: &str) -> Option<&UploadStorageLink> {
        self.storage_links
            .iter()
            .find(|link| link.version.eq_ignore_ascii_case(version))
    }
}

/// A stored rendition attached to an upload. Versions are kept as strings:
/// older records carry tags this worker never produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStorageLink {
    pub bucket: String,
    pub path: String,
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailJob<'a> {
    #[serde(flatten)]
    pub upload: &'a VideoUpload,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionJob<'a> {
    #[serde(flatten)]
    pub upload: &'a VideoUpload,
    pub audio_storage_link: ObjectRef,
}
