//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{TranscodeError, TranscodeResult};

/// Default program name resolved on `PATH`.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Upper bound on captured stderr kept for diagnostics.
const MAX_STDERR_BYTES: usize = 8 * 1024;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek in the decoded stream (after input), as `-ss <timestamp>`.
    pub fn output_seek(self, timestamp: impl Into<String>) -> Self {
        self.output_arg("-ss").output_arg(timestamp)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Set video quality scale (`-q:v`).
    pub fn video_quality(self, quality: u8) -> Self {
        self.output_arg("-q:v").output_arg(quality.to_string())
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Disable the `-y` overwrite flag.
    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with stderr capture and an optional timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Program name or path
    program: PathBuf,
    /// Timeout for a single invocation
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner for `ffmpeg` on `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            timeout: None,
        }
    }

    /// Use an explicit program name or path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set timeout. The process is killed when it is exceeded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> TranscodeResult<()> {
        let program = check_program(&self.program)?;
        let args = cmd.build_args();
        debug!("Running {} {}", program.display(), args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&program, e))?;

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                tail(&String::from_utf8_lossy(&buf), MAX_STDERR_BYTES)
            })
        });

        let result = self.wait_for_completion(&mut child).await;

        let stderr = match stderr_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        match result? {
            status if status.success() => Ok(()),
            status => Err(TranscodeError::failed(status.code(), stderr.trim())),
        }
    }

    /// Wait for the child, killing it on timeout.
    async fn wait_for_completion(
        &self,
        child: &mut Child,
    ) -> TranscodeResult<std::process::ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, killing process",
                    self.program.display(),
                    timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out process: {}", e);
                }
                Err(TranscodeError::Timeout(timeout))
            }
        }
    }
}

/// Resolve a program to an executable path.
///
/// Bare names are looked up on `PATH`; anything with a path separator is used
/// as given and checked at spawn time.
pub fn check_program(program: &Path) -> TranscodeResult<PathBuf> {
    if program.components().count() > 1 {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|_| TranscodeError::NotFound {
        program: program.display().to_string(),
    })
}

fn spawn_error(program: &Path, e: std::io::Error) -> TranscodeError {
    let program = program.display().to_string();
    if e.kind() == std::io::ErrorKind::NotFound {
        TranscodeError::NotFound { program }
    } else {
        TranscodeError::SpawnFailed { program, source: e }
    }
}

/// Keep at most the last `max` bytes of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("/in/clip.mp4", "/out/clip_thumb.jpg")
            .output_seek("00:00:01")
            .single_frame()
            .video_quality(2);

        assert_eq!(
            cmd.build_args(),
            vec![
                "-y",
                "-v",
                "error",
                "-i",
                "/in/clip.mp4",
                "-ss",
                "00:00:01",
                "-vframes",
                "1",
                "-q:v",
                "2",
                "/out/clip_thumb.jpg",
            ]
        );
    }

    #[test]
    fn test_input_args_precede_input() {
        let cmd = FfmpegCommand::new("a.mp4", "b.jpg")
            .input_arg("-hide_banner")
            .no_overwrite()
            .log_level("quiet");
        let args = cmd.build_args();
        assert_eq!(args[0], "-v");
        assert_eq!(args[1], "quiet");
        assert_eq!(args[2], "-hide_banner");
        assert_eq!(args[3], "-i");
        assert_eq!(args.last().unwrap(), "b.jpg");
    }

    #[test]
    fn test_check_program_missing_on_path() {
        let err = check_program(Path::new("mediaq-no-such-transcoder")).unwrap_err();
        assert!(matches!(err, TranscodeError::NotFound { .. }));
    }

    #[test]
    fn test_check_program_explicit_path_passthrough() {
        let path = Path::new("/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(check_program(path).unwrap(), path.to_path_buf());
    }

    #[tokio::test]
    async fn test_run_missing_explicit_path() {
        let runner = FfmpegRunner::new().with_program("/nonexistent/bin/ffmpeg");
        let cmd = FfmpegCommand::new("a.mp4", "b.jpg");
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, TranscodeError::NotFound { .. }), "{err}");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        let s = "ééé";
        let t = tail(s, 3);
        assert!(s.ends_with(&t));
        assert!(t.len() <= 3);
    }
}
