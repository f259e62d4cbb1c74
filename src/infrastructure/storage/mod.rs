//! Object storage seam.
//!
//! The render pipeline only needs three things from a bucket: read an object
//! as a byte stream, write an object as a byte stream with a declared content
//! type, and be able to throw away a write that went wrong.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::modules::render::model::ObjectRef;

#[cfg(test)]
pub mod memory;
pub mod s3;

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("storage request failed: {0}")]
    Request(String),

    #[error("writer for {0} is already closed")]
    Closed(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens a fresh read stream over the whole object.
    async fn open_read(&self, object: &ObjectRef) -> Result<ObjectReader, StorageError>;

    /// Opens a write stream. Nothing becomes visible at the destination until
    /// [`ObjectWriter::finish`] succeeds.
    async fn open_write(
        &self,
        object: &ObjectRef,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StorageError>;
}

#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError>;

    /// Commits everything written so far and returns the total size.
    async fn finish(&mut self) -> Result<u64, StorageError>;

    /// Discards everything written so far.
    async fn abort(&mut self) -> Result<(), StorageError>;
}
