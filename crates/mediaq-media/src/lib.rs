//! FFmpeg CLI wrapper for media jobs.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with stderr capture and timeouts
//! - The `Transcoder` seam and its FFmpeg-backed thumbnail implementation

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod thumbnail;

pub use command::{check_program, FfmpegCommand, FfmpegRunner};
pub use error::{TranscodeError, TranscodeResult};
pub use thumbnail::{FfmpegTranscoder, Transcoder};
