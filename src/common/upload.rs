use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::infrastructure::storage::{ObjectStore, ObjectWriter, StorageError};
use crate::modules::render::model::ObjectRef;

const UPLOAD_CHUNK: usize = 256 * 1024;

/// Copies `reader` into `writer` and commits it. On any failure the writer is
/// aborted, so nothing is left visible at the destination.
pub async fn stream_to_object<R>(
    reader: R,
    writer: &mut dyn ObjectWriter,
) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin,
{
    let mut chunks = ReaderStream::with_capacity(reader, UPLOAD_CHUNK);

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                discard(writer).await;
                return Err(StorageError::Io(e));
            }
        };

        if let Err(e) = writer.write_chunk(chunk).await {
            error!("Upload error: {}", e);
            discard(writer).await;
            return Err(e);
        }
    }

    match writer.finish().await {
        Ok(size) => Ok(size),
        Err(e) => {
            discard(writer).await;
            Err(e)
        }
    }
}

/// Uploads a local file to `destination` with the given content type.
pub async fn upload_file(
    storage: &dyn ObjectStore,
    path: &Path,
    destination: &ObjectRef,
    content_type: &str,
) -> Result<u64, StorageError> {
    let file = tokio::fs::File::open(path).await?;
    let mut writer = storage.open_write(destination, content_type).await?;
    let size = stream_to_object(file, writer.as_mut()).await?;

    info!(bucket = %destination.bucket, path = %destination.path, size, "Uploaded file");
    Ok(size)
}

async fn discard(writer: &mut dyn ObjectWriter) {
    if let Err(e) = writer.abort().await {
        error!("Failed to abort upload: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::memory::MemoryStorage;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Yields some bytes, then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn uploads_a_local_file_with_its_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        tokio::fs::write(&path, b"fLaC-data").await.unwrap();

        let storage = MemoryStorage::new();
        let dest = ObjectRef::new("b", "clips/a.flac");
        let size = upload_file(&storage, &path, &dest, "audio/flac").await.unwrap();

        assert_eq!(size, 9);
        let stored = storage.get("b", "clips/a.flac").unwrap();
        assert_eq!(stored.data.as_ref(), b"fLaC-data");
        assert_eq!(stored.content_type, "audio/flac");
    }

    #[tokio::test]
    async fn broken_stream_leaves_nothing_behind() {
        let storage = MemoryStorage::new();
        let dest = ObjectRef::new("b", "out.bin");
        let mut writer = storage.open_write(&dest, "video/mp4").await.unwrap();

        let err = stream_to_object(BrokenReader { sent: false }, writer.as_mut())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
        assert!(storage.get("b", "out.bin").is_none());
    }

    #[tokio::test]
    async fn missing_local_file_is_an_io_error() {
        let storage = MemoryStorage::new();
        let err = upload_file(
            &storage,
            Path::new("/nonexistent/a.flac"),
            &ObjectRef::new("b", "a.flac"),
            "audio/flac",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(storage.len(), 0);
    }
}
