use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::model::ObjectRef;
use crate::infrastructure::storage::{ObjectStore, StorageError};

/// Per-job scratch directory. Everything in it is removed when the workspace
/// is closed or dropped, whatever the job outcome.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(root: &Path, content_id: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("render-{}-", sanitize(content_id)))
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Local copy of the job's source object.
    pub fn source_path(&self, source: &ObjectRef) -> PathBuf {
        self.path().join(format!("src-{}", sanitize(source.file_name())))
    }

    /// Intermediate file for an operation that encodes locally before upload.
    pub fn scratch_path(&self, destination: &ObjectRef) -> PathBuf {
        self.path().join(sanitize(destination.file_name()))
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "object".to_string(),
        rest => rest.to_string(),
    }
}

/// Downloads source objects into a job workspace.
#[derive(Clone)]
pub struct SourceFetcher {
    storage: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(storage: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    pub async fn fetch(
        &self,
        source: &ObjectRef,
        workspace: &JobWorkspace,
    ) -> Result<PathBuf, FetchError> {
        let local = workspace.source_path(source);

        let outcome = tokio::time::timeout(self.timeout, self.download(source, &local)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(source, self.timeout.as_secs())),
        };

        match result {
            Ok(size) => {
                info!(bucket = %source.bucket, path = %source.path, size, "Fetched source");
                Ok(local)
            }
            Err(e) => {
                warn!(bucket = %source.bucket, path = %source.path, error = %e, "Fetch failed");
                let _ = tokio::fs::remove_file(&local).await;
                Err(e)
            }
        }
    }

    async fn download(&self, source: &ObjectRef, local: &Path) -> Result<u64, FetchError> {
        let mut reader = self.storage.open_read(source).await.map_err(|e| match e {
            StorageError::NotFound { .. } => FetchError::not_found(source),
            other => FetchError::interrupted(source, other),
        })?;

        let mut file = File::create(local).await.map_err(FetchError::Workspace)?;
        debug!(local = %local.display(), "Downloading source");

        let size = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| FetchError::interrupted(source, e))?;
        file.flush().await.map_err(FetchError::Workspace)?;

        Ok(size)
    }
}
