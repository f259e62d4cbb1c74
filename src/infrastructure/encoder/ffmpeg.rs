//! FFmpeg command builder and runner.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::infrastructure::storage::{ObjectReader, ObjectWriter, StorageError};

const PIPE_CHUNK: usize = 256 * 1024;
const DIAGNOSTIC_LINES: usize = 20;

/// Where the encoder reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    File(PathBuf),
    /// stdin for inputs, stdout for outputs.
    Pipe,
}

impl Endpoint {
    fn as_input_arg(&self) -> String {
        match self {
            Endpoint::File(path) => path.to_string_lossy().into_owned(),
            Endpoint::Pipe => "pipe:0".to_string(),
        }
    }

    fn as_output_arg(&self) -> String {
        match self {
            Endpoint::File(path) => path.to_string_lossy().into_owned(),
            Endpoint::Pipe => "pipe:1".to_string(),
        }
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: Endpoint,
    output: Endpoint,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: Endpoint, output: Endpoint) -> Self {
        Self {
            input,
            output,
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input(&self) -> &Endpoint {
        &self.input
    }

    pub fn output(&self) -> &Endpoint {
        &self.output
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Declares the input demuxer. Required when reading from a pipe.
    pub fn input_format(self, format: impl Into<String>) -> Self {
        self.input_arg("-f").input_arg(format)
    }

    /// Sets the output muxer.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{kbps}k"))
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn movflags(self, flags: impl Into<String>) -> Self {
        self.output_arg("-movflags").output_arg(flags)
    }

    pub fn quantizer_range(self, qmin: u8, qmax: u8) -> Self {
        self.output_arg("-qmin")
            .output_arg(qmin.to_string())
            .output_arg("-qmax")
            .output_arg(qmax.to_string())
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn audio_channels(self, channels: u8) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.as_input_arg());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.as_output_arg());

        args
    }
}

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("failed to start encoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("encoder exited with {}: {diagnostic}", describe_exit(.code))]
    Exited {
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("encoder timed out after {0} seconds")]
    Timeout(u64),

    #[error("reading encoder input failed: {0}")]
    Input(#[source] io::Error),

    #[error("reading encoder output failed: {0}")]
    Output(#[source] io::Error),

    #[error("writing encoder output failed: {0}")]
    Sink(#[source] StorageError),

    #[error("waiting for encoder failed: {0}")]
    Wait(#[source] io::Error),

    #[error("encoder wiring mismatch: {0}")]
    Wiring(&'static str),
}

impl FfmpegError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FfmpegError::Exited { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs FFmpeg commands as child processes, streaming stdin from an object
/// reader and stdout into an object writer.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: PathBuf,
    /// Arguments placed before the generated command line, for wrappers such
    /// as `nice` or a script interpreter.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl FfmpegRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `cmd` to completion and returns the number of bytes streamed into
    /// `stdout`. `stdin` must be given exactly when the command reads a pipe,
    /// `stdout` exactly when it writes one.
    pub async fn run(
        &self,
        cmd: &FfmpegCommand,
        stdin: Option<ObjectReader>,
        stdout: Option<&mut dyn ObjectWriter>,
    ) -> Result<u64, FfmpegError> {
        if (*cmd.input() == Endpoint::Pipe) != stdin.is_some() {
            return Err(FfmpegError::Wiring("stdin source does not match command input"));
        }
        if (*cmd.output() == Endpoint::Pipe) != stdout.is_some() {
            return Err(FfmpegError::Wiring("stdout sink does not match command output"));
        }

        let args = cmd.build_args();
        debug!(
            "Started encoder with command: {} {} {}",
            self.program.display(),
            self.leading_args.join(" "),
            args.join(" ")
        );

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(if stdout.is_some() { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FfmpegError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let feeding = async move {
            match (stdin, stdin_pipe) {
                (Some(source), Some(pipe)) => feed(source, pipe).await,
                _ => Ok(0),
            }
        };
        let draining = async move {
            match (stdout, stdout_pipe) {
                (Some(sink), Some(pipe)) => drain(pipe, sink).await,
                _ => Ok(0),
            }
        };
        let work = async {
            tokio::join!(feeding, draining, collect_diagnostics(stderr_pipe), child.wait())
        };

        let outcome = tokio::time::timeout(self.timeout, work).await;
        let Ok((fed, drained, diagnostic, status)) = outcome else {
            warn!(
                "Encoder timed out after {} seconds, killing process",
                self.timeout.as_secs()
            );
            let _ = child.kill().await;
            return Err(FfmpegError::Timeout(self.timeout.as_secs()));
        };

        let status = status.map_err(FfmpegError::Wait)?;
        fed?;

        if !status.success() {
            return Err(FfmpegError::Exited {
                code: status.code(),
                diagnostic,
            });
        }

        drained
    }
}

async fn feed(mut source: ObjectReader, mut pipe: ChildStdin) -> Result<u64, FfmpegError> {
    let mut buf = vec![0u8; PIPE_CHUNK];
    let mut total = 0u64;

    loop {
        let n = source.read(&mut buf).await.map_err(FfmpegError::Input)?;
        if n == 0 {
            break;
        }
        if let Err(e) = pipe.write_all(&buf[..n]).await {
            // The encoder stopped reading; its exit status tells why.
            debug!(error = %e, "Encoder closed its input early");
            return Ok(total);
        }
        total += n as u64;
    }

    let _ = pipe.shutdown().await;
    Ok(total)
}

async fn drain(pipe: ChildStdout, sink: &mut dyn ObjectWriter) -> Result<u64, FfmpegError> {
    let mut chunks = ReaderStream::with_capacity(pipe, PIPE_CHUNK);
    let mut total = 0u64;
    let mut failure = None;

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                failure.get_or_insert(FfmpegError::Output(e));
                break;
            }
        };
        // After a sink failure keep reading so the encoder never blocks on a full pipe.
        if failure.is_some() {
            continue;
        }
        total += chunk.len() as u64;
        if let Err(e) = sink.write_chunk(chunk).await {
            failure = Some(FfmpegError::Sink(e));
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(total),
    }
}

async fn collect_diagnostics(pipe: Option<ChildStderr>) -> String {
    let mut raw = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut raw).await;
    }
    tail_lines(&String::from_utf8_lossy(&raw), DIAGNOSTIC_LINES)
}

fn tail_lines(text: &str, limit: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return "no diagnostic output".to_string();
    }
    lines[lines.len().saturating_sub(limit)..].join("\n")
}
