use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DecodeError;
use super::model::ObjectRef;

/// The fields of an inbound render job the worker relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload {
    pub id: String,
    pub raw_storage_link: ObjectRef,
}

/// A decoded render job: the typed view plus the original document, which is
/// echoed back untouched as `requestPayload`.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub payload: RenderPayload,
    pub raw: Value,
}

impl RenderJob {
    pub fn id(&self) -> &str {
        &self.payload.id
    }

    pub fn source(&self) -> &ObjectRef {
        &self.payload.raw_storage_link
    }
}

/// Decodes a message body that is either a JSON document or the base64
/// encoding of one.
pub fn decode(data: &[u8]) -> Result<RenderJob, DecodeError> {
    let trimmed = data.trim_ascii();
    let json: Cow<'_, [u8]> = if trimmed.starts_with(b"{") {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(STANDARD.decode(trimmed)?)
    };

    let raw: Value = serde_json::from_slice(&json)?;
    let payload = RenderPayload::deserialize(&raw)?;

    if payload.id.trim().is_empty() {
        return Err(DecodeError::Empty("id"));
    }
    if payload.raw_storage_link.bucket.trim().is_empty() {
        return Err(DecodeError::Empty("rawStorageLink.bucket"));
    }
    if payload.raw_storage_link.path.trim().is_empty() {
        return Err(DecodeError::Empty("rawStorageLink.path"));
    }

    Ok(RenderJob { payload, raw })
}

/// Encodes a job document the way [`decode`] expects it on the wire.
pub fn encode<T: Serialize>(document: &T) -> Result<Vec<u8>, serde_json::Error> {
    Ok(STANDARD.encode(serde_json::to_vec(document)?).into_bytes())
}
