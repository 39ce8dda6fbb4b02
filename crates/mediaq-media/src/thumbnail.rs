//! Thumbnail generation.
//!
//! A single frame is taken at a fixed one-second offset. The cost is constant
//! regardless of input duration; no attempt is made to pick a "good" frame.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use mediaq_models::{THUMBNAIL_QUALITY, THUMBNAIL_TIMESTAMP};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{TranscodeError, TranscodeResult};
use crate::fs_utils::{file_len, remove_if_exists};

/// Produces a derived artifact from a local media file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write exactly one artifact at `output` derived from `input`.
    ///
    /// `output`'s parent directory must already exist. On error nothing is
    /// left at `output`.
    async fn generate_derived_artifact(&self, input: &Path, output: &Path) -> TranscodeResult<()>;
}

/// FFmpeg-backed thumbnail extractor.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// The thumbnail invocation:
    /// `-i <input> -ss 00:00:01 -vframes 1 -q:v 2 <output>`.
    pub fn thumbnail_command(input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .output_seek(THUMBNAIL_TIMESTAMP)
            .single_frame()
            .video_quality(THUMBNAIL_QUALITY)
            .log_level("error")
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn generate_derived_artifact(&self, input: &Path, output: &Path) -> TranscodeResult<()> {
        if file_len(input).await?.is_none() {
            return Err(TranscodeError::InputNotFound(input.to_path_buf()));
        }

        let cmd = Self::thumbnail_command(input, output);
        let outcome = match self.runner.run(&cmd).await {
            Ok(()) => match file_len(output).await? {
                Some(len) if len > 0 => {
                    debug!("Generated thumbnail {} ({} bytes)", output.display(), len);
                    return Ok(());
                }
                _ => TranscodeError::MissingOutput(output.to_path_buf()),
            },
            Err(e) => e,
        };

        discard_partial(output).await;
        Err(outcome)
    }
}

/// Remove whatever the tool left behind at `output` after a failure.
async fn discard_partial(output: &Path) {
    match remove_if_exists(output).await {
        Ok(true) => debug!("Discarded partial output {}", output.display()),
        Ok(false) => {}
        Err(e) => warn!(
            "Failed to discard partial output {}: {}",
            output.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_thumbnail_command_args() {
        let cmd = FfmpegTranscoder::thumbnail_command(
            Path::new("/tmp/in/clip.mp4"),
            Path::new("/tmp/stage/clip_thumb.jpg"),
        );
        let args = cmd.build_args().join(" ");
        assert!(args.ends_with(
            "-i /tmp/in/clip.mp4 -ss 00:00:01 -vframes 1 -q:v 2 /tmp/stage/clip_thumb.jpg"
        ));
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected_before_launch() {
        let dir = TempDir::new().unwrap();
        let transcoder = FfmpegTranscoder::new(
            FfmpegRunner::new().with_program("/nonexistent/bin/ffmpeg"),
        );
        let err = transcoder
            .generate_derived_artifact(&dir.path().join("missing.mp4"), &dir.path().join("t.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::InputNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_tool_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        let output = dir.path().join("clip_thumb.jpg");
        tokio::fs::write(&input, b"not really a video").await.unwrap();
        // stale file from an earlier attempt must not survive a failure
        tokio::fs::write(&output, b"stale").await.unwrap();

        let transcoder = FfmpegTranscoder::new(
            FfmpegRunner::new().with_program("/nonexistent/bin/ffmpeg"),
        );
        let err = transcoder
            .generate_derived_artifact(&input, &output)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscodeError::NotFound { .. }));
        assert!(!output.exists());
        assert!(input.exists());
    }
}
