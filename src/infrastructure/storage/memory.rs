use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectReader, ObjectStore, ObjectWriter, StorageError};
use crate::modules::render::model::ObjectRef;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

type Objects = Arc<Mutex<HashMap<(String, String), StoredObject>>>;

/// Bucket-in-a-hashmap used by the pipeline tests.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Objects,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, path: &str, data: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), path.to_string()),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn open_read(&self, object: &ObjectRef) -> Result<ObjectReader, StorageError> {
        let stored = self
            .get(&object.bucket, &object.path)
            .ok_or_else(|| StorageError::NotFound {
                bucket: object.bucket.clone(),
                key: object.path.clone(),
            })?;
        Ok(Box::pin(Cursor::new(stored.data)))
    }

    async fn open_write(
        &self,
        object: &ObjectRef,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StorageError> {
        Ok(Box::new(MemoryWriter {
            objects: self.objects.clone(),
            key: (object.bucket.clone(), object.path.clone()),
            content_type: content_type.to_string(),
            buffer: Vec::new(),
            closed: false,
        }))
    }
}

struct MemoryWriter {
    objects: Objects,
    key: (String, String),
    content_type: String,
    buffer: Vec<u8>,
    closed: bool,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Closed(self.key.1.clone()));
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, StorageError> {
        if self.closed {
            return Err(StorageError::Closed(self.key.1.clone()));
        }
        self.closed = true;
        let data = Bytes::from(std::mem::take(&mut self.buffer));
        let size = data.len() as u64;
        self.objects.lock().unwrap().insert(
            self.key.clone(),
            StoredObject {
                data,
                content_type: self.content_type.clone(),
            },
        );
        Ok(size)
    }

    async fn abort(&mut self) -> Result<(), StorageError> {
        self.closed = true;
        self.buffer.clear();
        Ok(())
    }
}
