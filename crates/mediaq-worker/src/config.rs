//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use mediaq_media::{FfmpegRunner, FfmpegTranscoder};

use crate::error::{WorkerError, WorkerResult};

/// Slack on top of the step timeouts for staging, cleanup and the ack.
pub const ATTEMPT_MARGIN: Duration = Duration::from_secs(60);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Most deliveries taken from the broker in one fetch
    pub max_fetch_batch: usize,
    /// Root directory for per-attempt staging
    pub work_dir: PathBuf,
    /// Limit for a single transcoder run, `None` to wait forever
    pub transcode_timeout: Option<Duration>,
    /// Limit for a single upload, `None` to wait forever
    pub upload_timeout: Option<Duration>,
    /// How often the worker scans for deliveries abandoned by crashed workers
    pub claim_interval: Duration,
    /// How long one fetch blocks waiting for new jobs
    pub fetch_block: Duration,
    /// Explicit transcoder binary, otherwise `ffmpeg` on `PATH`
    pub ffmpeg_path: Option<PathBuf>,
    /// Prometheus listener address
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_fetch_batch: 5,
            work_dir: PathBuf::from("/tmp/mediaq"),
            transcode_timeout: Some(Duration::from_secs(120)),
            upload_timeout: Some(Duration::from_secs(300)),
            claim_interval: Duration::from_secs(30),
            fetch_block: Duration::from_millis(1000),
            ffmpeg_path: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_fetch_batch: defaults.max_fetch_batch,
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            transcode_timeout: env_timeout("WORKER_TRANSCODE_TIMEOUT")
                .unwrap_or(defaults.transcode_timeout),
            upload_timeout: env_timeout("WORKER_UPLOAD_TIMEOUT").unwrap_or(defaults.upload_timeout),
            claim_interval: Duration::from_secs(
                env_parse("WORKER_CLAIM_INTERVAL_SECS")
                    .filter(|n: &u64| *n > 0)
                    .unwrap_or(30),
            ),
            fetch_block: Duration::from_millis(env_parse("WORKER_BLOCK_MS").unwrap_or(1000)),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            metrics_addr: std::env::var("METRICS_ADDR").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Longest one attempt may run, `None` when a step has no limit.
    pub fn max_attempt_duration(&self) -> Option<Duration> {
        Some(self.transcode_timeout? + self.upload_timeout? + ATTEMPT_MARGIN)
    }

    /// Reject a visibility timeout that would let a running attempt be
    /// claimed by another consumer.
    pub fn check_visibility_timeout(&self, visibility_timeout: Duration) -> WorkerResult<()> {
        match self.max_attempt_duration() {
            Some(required) if visibility_timeout < required => Err(WorkerError::config_error(
                format!(
                    "QUEUE_VISIBILITY_TIMEOUT ({}s) must be at least {}s \
                     (transcode + upload timeouts + {}s)",
                    visibility_timeout.as_secs(),
                    required.as_secs(),
                    ATTEMPT_MARGIN.as_secs()
                ),
            )),
            Some(_) => Ok(()),
            None => {
                warn!(
                    "Step timeouts are disabled; a job running longer than {}s may be redelivered while in flight",
                    visibility_timeout.as_secs()
                );
                Ok(())
            }
        }
    }

    /// Thumbnail transcoder honouring `ffmpeg_path` and `transcode_timeout`.
    pub fn transcoder(&self) -> FfmpegTranscoder {
        let mut runner = FfmpegRunner::new();
        if let Some(path) = &self.ffmpeg_path {
            runner = runner.with_program(path);
        }
        if let Some(timeout) = self.transcode_timeout {
            runner = runner.with_timeout(timeout);
        }
        FfmpegTranscoder::new(runner)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Seconds from the environment; `0` disables the limit.
fn env_timeout(name: &str) -> Option<Option<Duration>> {
    env_parse::<u64>(name).map(|secs| (secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/mediaq"));
        assert_eq!(config.transcode_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.fetch_block, Duration::from_secs(1));
    }

    #[test]
    fn test_transcoder_uses_configured_program_and_timeout() {
        let config = WorkerConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            transcode_timeout: Some(Duration::from_secs(7)),
            ..WorkerConfig::default()
        };
        let transcoder = config.transcoder();
        assert_eq!(
            transcoder.runner().program(),
            std::path::Path::new("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(transcoder.runner().timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_default_visibility_timeout_covers_an_attempt() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_attempt_duration(), Some(Duration::from_secs(480)));
        assert!(config
            .check_visibility_timeout(Duration::from_secs(
                mediaq_queue::DEFAULT_VISIBILITY_TIMEOUT_SECS
            ))
            .is_ok());
    }

    #[test]
    fn test_short_visibility_timeout_rejected() {
        let config = WorkerConfig::default();
        let err = config
            .check_visibility_timeout(Duration::from_secs(300))
            .unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
        assert!(err.to_string().contains("480s"));
    }

    #[test]
    fn test_unbounded_attempt_accepts_any_visibility_timeout() {
        let config = WorkerConfig {
            upload_timeout: None,
            ..WorkerConfig::default()
        };
        assert_eq!(config.max_attempt_duration(), None);
        assert!(config.check_visibility_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_disabled_timeout() {
        let config = WorkerConfig {
            transcode_timeout: None,
            ..WorkerConfig::default()
        };
        assert_eq!(config.transcoder().runner().timeout(), None);
    }
}
