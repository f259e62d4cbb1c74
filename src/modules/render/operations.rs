use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::error::EncodeError;
use super::fetcher::JobWorkspace;
use super::model::{ObjectRef, Stage};
use crate::common::upload::upload_file;
use crate::infrastructure::encoder::{Endpoint, FfmpegCommand, FfmpegRunner};
use crate::infrastructure::storage::{ObjectReader, ObjectStore, ObjectWriter};

const SCALE_720P_WIDTH: &str = "scale=1280:-2";

/// What a transcode operation reads from.
#[derive(Debug, Clone, Copy)]
pub enum SourceInput<'a> {
    /// A file already in the job workspace; the encoder detects its container.
    Local(&'a Path),
    /// A fresh read stream over the remote object, piped to the encoder.
    Remote(&'a ObjectRef),
}

/// Demuxer to declare for a piped input, from the source extension.
pub fn demuxer_for(extension: Option<&str>) -> Option<String> {
    let ext = extension?.to_ascii_lowercase();
    let demuxer = match ext.as_str() {
        "mov" | "mp4" | "m4v" | "m4a" | "3gp" => "mov",
        "mkv" | "webm" => "matroska",
        "ts" | "m2ts" => "mpegts",
        "wmv" => "asf",
        _ => return Some(ext),
    };
    Some(demuxer.to_string())
}

/// The encoder invocation for one stage.
pub fn encoder_command(
    stage: Stage,
    input: Endpoint,
    input_format: Option<&str>,
    output: Endpoint,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);
    if let Some(format) = input_format {
        cmd = cmd.input_format(format);
    }

    match stage {
        Stage::VideoFormatA => cmd
            .format("mp4")
            .video_codec("libx264")
            .audio_codec("aac")
            .video_filter(SCALE_720P_WIDTH)
            .crf(22)
            // Fragmented output, so the muxer never needs to seek back on a pipe.
            .movflags("faststart+frag_keyframe")
            .preset("slow"),
        Stage::VideoFormatB => cmd
            .format("webm")
            .video_codec("libvpx")
            .audio_codec("libvorbis")
            .video_bitrate_kbps(1000)
            .video_filter(SCALE_720P_WIDTH)
            .quantizer_range(0, 25),
        Stage::AudioExtract => cmd
            .no_video()
            .format("flac")
            .audio_codec("flac")
            .audio_channels(1),
    }
}

/// Runs the three transcode operations against object storage.
#[derive(Clone)]
pub struct Transcoder {
    storage: Arc<dyn ObjectStore>,
    ffmpeg: FfmpegRunner,
}

impl Transcoder {
    pub fn new(storage: Arc<dyn ObjectStore>, ffmpeg: FfmpegRunner) -> Self {
        Self { storage, ffmpeg }
    }

    /// Produces `destination` from `input`. Returns the size of the stored
    /// artifact. On failure nothing is committed at `destination`.
    pub async fn run(
        &self,
        stage: Stage,
        input: SourceInput<'_>,
        destination: &ObjectRef,
        workspace: &JobWorkspace,
    ) -> Result<u64, EncodeError> {
        info!(%stage, bucket = %destination.bucket, path = %destination.path, "Starting transcode");

        let result = match stage {
            Stage::AudioExtract => {
                self.encode_then_upload(stage, input, destination, workspace)
                    .await
            }
            Stage::VideoFormatA | Stage::VideoFormatB => {
                self.encode_streaming(stage, input, destination).await
            }
        };

        match &result {
            Ok(size) => info!(%stage, path = %destination.path, size, "Transcode finished"),
            Err(e) => error!(%stage, path = %destination.path, error = %e, "Transcode failed"),
        }
        result
    }

    async fn open_input(
        &self,
        stage: Stage,
        input: SourceInput<'_>,
    ) -> Result<(Endpoint, Option<String>, Option<ObjectReader>), EncodeError> {
        match input {
            SourceInput::Local(path) => Ok((Endpoint::File(path.to_path_buf()), None, None)),
            SourceInput::Remote(source) => {
                let reader = self.storage.open_read(source).await.map_err(|e| {
                    EncodeError::new(stage, format!("could not open source {source}: {e}"))
                })?;
                Ok((Endpoint::Pipe, demuxer_for(source.extension()), Some(reader)))
            }
        }
    }

    async fn encode_streaming(
        &self,
        stage: Stage,
        input: SourceInput<'_>,
        destination: &ObjectRef,
    ) -> Result<u64, EncodeError> {
        let (endpoint, input_format, reader) = self.open_input(stage, input).await?;
        let cmd = encoder_command(stage, endpoint, input_format.as_deref(), Endpoint::Pipe);

        let mut writer = self
            .storage
            .open_write(destination, stage.variant().content_type())
            .await
            .map_err(|e| EncodeError::new(stage, format!("could not open {destination}: {e}")))?;

        let encoded = self.ffmpeg.run(&cmd, reader, Some(writer.as_mut())).await;
        if let Err(e) = encoded {
            discard(writer.as_mut(), destination).await;
            return Err(EncodeError::from_ffmpeg(stage, e));
        }

        match writer.finish().await {
            Ok(size) => Ok(size),
            Err(e) => {
                discard(writer.as_mut(), destination).await;
                Err(EncodeError::new(stage, format!("could not commit {destination}: {e}")))
            }
        }
    }

    async fn encode_then_upload(
        &self,
        stage: Stage,
        input: SourceInput<'_>,
        destination: &ObjectRef,
        workspace: &JobWorkspace,
    ) -> Result<u64, EncodeError> {
        let (endpoint, input_format, reader) = self.open_input(stage, input).await?;
        let scratch = workspace.scratch_path(destination);
        let cmd = encoder_command(
            stage,
            endpoint,
            input_format.as_deref(),
            Endpoint::File(scratch.clone()),
        );

        let result = match self.ffmpeg.run(&cmd, reader, None).await {
            Ok(_) => upload_file(
                self.storage.as_ref(),
                &scratch,
                destination,
                stage.variant().content_type(),
            )
            .await
            .map_err(|e| EncodeError::new(stage, format!("could not upload {destination}: {e}"))),
            Err(e) => Err(EncodeError::from_ffmpeg(stage, e)),
        };

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %scratch.display(), error = %e, "Failed to remove intermediate file");
            }
        }

        result
    }
}

async fn discard(writer: &mut dyn ObjectWriter, destination: &ObjectRef) {
    if let Err(e) = writer.abort().await {
        warn!(
            bucket = %destination.bucket,
            path = %destination.path,
            error = %e,
            "Failed to discard partial output"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::encoder::testing::{COPY_SCRIPT, failing_on, script_runner};
    use crate::infrastructure::storage::memory::MemoryStorage;
    use crate::modules::render::model::Variant;

    fn output_args(stage: Stage) -> Vec<String> {
        let args = encoder_command(stage, Endpoint::Pipe, None, Endpoint::Pipe).build_args();
        let start = args.iter().position(|a| a == "pipe:0").unwrap() + 1;
        args[start..args.len() - 1].to_vec()
    }

    #[test]
    fn format_a_is_h264_aac_mp4() {
        assert_eq!(
            output_args(Stage::VideoFormatA),
            [
                "-f", "mp4", "-c:v", "libx264", "-c:a", "aac", "-vf", "scale=1280:-2", "-crf",
                "22", "-movflags", "faststart+frag_keyframe", "-preset", "slow"
            ]
        );
    }

    #[test]
    fn format_b_is_vp8_vorbis_webm() {
        assert_eq!(
            output_args(Stage::VideoFormatB),
            [
                "-f", "webm", "-c:v", "libvpx", "-c:a", "libvorbis", "-b:v", "1000k", "-vf",
                "scale=1280:-2", "-qmin", "0", "-qmax", "25"
            ]
        );
    }

    #[test]
    fn audio_extract_is_mono_flac_without_video() {
        assert_eq!(
            output_args(Stage::AudioExtract),
            ["-vn", "-f", "flac", "-c:a", "flac", "-ac", "1"]
        );
    }

    #[test]
    fn piped_inputs_declare_a_demuxer() {
        assert_eq!(demuxer_for(Some("MOV")).as_deref(), Some("mov"));
        assert_eq!(demuxer_for(Some("webm")).as_deref(), Some("matroska"));
        assert_eq!(demuxer_for(Some("avi")).as_deref(), Some("avi"));
        assert_eq!(demuxer_for(None), None);

        let args = encoder_command(
            Stage::VideoFormatA,
            Endpoint::Pipe,
            Some("matroska"),
            Endpoint::Pipe,
        )
        .build_args();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input - 2..input], ["-f", "matroska"]);
    }

    #[tokio::test]
    async fn streams_remote_source_into_destination() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(dir.path(), "v1").unwrap();
        let storage = MemoryStorage::new();
        storage.insert("b", "clips/a.mov", b"frames".to_vec());
        let transcoder = Transcoder::new(
            Arc::new(storage.clone()),
            script_runner(dir.path(), COPY_SCRIPT),
        );

        let source = ObjectRef::new("b", "clips/a.mov");
        let dest = source.derive(Variant::WebMp4);
        let size = transcoder
            .run(Stage::VideoFormatA, SourceInput::Remote(&source), &dest, &workspace)
            .await
            .unwrap();

        assert_eq!(size, 6);
        let stored = storage.get("b", "clips/a-web.mp4").unwrap();
        assert_eq!(stored.data.as_ref(), b"frames");
        assert_eq!(stored.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn audio_extract_uploads_and_removes_its_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(dir.path(), "v1").unwrap();
        let local = workspace.path().join("src-a.mov");
        std::fs::write(&local, b"pcm").unwrap();

        let storage = MemoryStorage::new();
        let transcoder = Transcoder::new(
            Arc::new(storage.clone()),
            script_runner(dir.path(), COPY_SCRIPT),
        );
        let dest = ObjectRef::new("b", "clips/a.flac");

        transcoder
            .run(Stage::AudioExtract, SourceInput::Local(&local), &dest, &workspace)
            .await
            .unwrap();

        let stored = storage.get("b", "clips/a.flac").unwrap();
        assert_eq!(stored.data.as_ref(), b"pcm");
        assert_eq!(stored.content_type, "audio/flac");
        assert!(!workspace.scratch_path(&dest).exists());
    }

    #[tokio::test]
    async fn failed_encode_is_tagged_and_leaves_no_object() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(dir.path(), "v1").unwrap();
        let storage = MemoryStorage::new();
        storage.insert("b", "clips/a.mov", b"frames".to_vec());
        let transcoder = Transcoder::new(
            Arc::new(storage.clone()),
            script_runner(dir.path(), &failing_on("libvpx")),
        );

        let source = ObjectRef::new("b", "clips/a.mov");
        let dest = source.derive(Variant::WebWebm);
        let err = transcoder
            .run(Stage::VideoFormatB, SourceInput::Remote(&source), &dest, &workspace)
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::VideoFormatB);
        assert_eq!(err.exit_code, Some(1));
        assert!(err.message.contains("simulated failure in libvpx"));
        assert!(storage.get("b", "clips/a-web.webm").is_none());
    }

    #[tokio::test]
    async fn missing_remote_source_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(dir.path(), "v1").unwrap();
        let transcoder = Transcoder::new(
            Arc::new(MemoryStorage::new()),
            script_runner(dir.path(), COPY_SCRIPT),
        );

        let source = ObjectRef::new("b", "gone.mov");
        let err = transcoder
            .run(
                Stage::VideoFormatA,
                SourceInput::Remote(&source),
                &source.derive(Variant::WebMp4),
                &workspace,
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::VideoFormatA);
        assert!(err.message.contains("could not open source b/gone.mov"));
    }
}
