use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use super::{ObjectReader, ObjectStore, ObjectWriter, StorageError};
use crate::config::settings::StorageConfig;
use crate::modules::render::model::ObjectRef;

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

/// S3-compatible object storage (MinIO, R2, AWS). Buckets come from each
/// [`ObjectRef`], so one client serves every container a job touches.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        info!(endpoint = %config.endpoint, region = %config.region, "S3 client configured");

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

fn request_error<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Request(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn open_read(&self, object: &ObjectRef) -> Result<ObjectReader, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.path)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    StorageError::NotFound {
                        bucket: object.bucket.clone(),
                        key: object.path.clone(),
                    }
                } else {
                    request_error(service)
                }
            })?;

        debug!(
            bucket = %object.bucket,
            path = %object.path,
            size = resp.content_length().unwrap_or_default(),
            "Opened object for reading"
        );

        Ok(Box::pin(resp.body.into_async_read()))
    }

    async fn open_write(
        &self,
        object: &ObjectRef,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StorageError> {
        Ok(Box::new(S3ObjectWriter {
            client: self.client.clone(),
            bucket: object.bucket.clone(),
            key: object.path.clone(),
            content_type: content_type.to_string(),
            upload_id: None,
            parts: Vec::new(),
            part_number: 1,
            buffer: BytesMut::with_capacity(MIN_PART_SIZE),
            written: 0,
            closed: false,
        }))
    }
}

/// Streams an object into S3. Small objects go up in a single `PutObject` on
/// `finish`; anything past one part switches to a multipart upload, which is
/// only completed (and therefore visible) on `finish`.
pub struct S3ObjectWriter {
    client: Client,
    bucket: String,
    key: String,
    content_type: String,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    part_number: i32,
    buffer: BytesMut,
    written: u64,
    closed: bool,
}

impl S3ObjectWriter {
    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Closed(format!("{}/{}", self.bucket, self.key)));
        }
        Ok(())
    }

    async fn upload_id(&mut self) -> Result<String, StorageError> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .send()
            .await
            .map_err(request_error)?;

        let id = result
            .upload_id()
            .ok_or_else(|| StorageError::Request("multipart upload has no upload id".into()))?
            .to_string();

        debug!(bucket = %self.bucket, key = %self.key, "Started multipart upload");
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn flush_part(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let upload_id = self.upload_id().await?;
        let body: Bytes = self.buffer.split().freeze();
        self.buffer.reserve(MIN_PART_SIZE);

        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(self.part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(request_error)?;

        let e_tag = result
            .e_tag()
            .ok_or_else(|| {
                StorageError::Request(format!("part {} returned no ETag", self.part_number))
            })?
            .to_string();

        self.parts.push(
            CompletedPart::builder()
                .e_tag(e_tag)
                .part_number(self.part_number)
                .build(),
        );
        self.part_number += 1;

        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, StorageError> {
        self.ensure_open()?;

        let Some(upload_id) = self.upload_id.clone() else {
            let body = self.buffer.clone().freeze();
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .content_type(&self.content_type)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(request_error)?;
            self.closed = true;
            self.buffer.clear();
            return Ok(self.written);
        };

        // Upload remaining buffer as last part
        self.flush_part().await?;

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(request_error)?;

        self.closed = true;
        Ok(self.written)
    }

    async fn abort(&mut self) -> Result<(), StorageError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();

        if let Some(upload_id) = self.upload_id.take() {
            warn!(bucket = %self.bucket, key = %self.key, "Aborting multipart upload");
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .send()
                .await
                .map_err(request_error)?;
        }

        Ok(())
    }
}
