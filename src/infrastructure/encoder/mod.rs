//! External encoder process (ffmpeg).

pub mod ffmpeg;
#[cfg(test)]
pub mod testing;

pub use ffmpeg::{Endpoint, FfmpegCommand, FfmpegError, FfmpegRunner};
