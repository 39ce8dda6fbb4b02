//! Transcoder tests against stand-in shell scripts.
//!
//! All scenarios live in one test so no other test in this binary forks
//! while a freshly written script is being executed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediaq_media::{FfmpegRunner, FfmpegTranscoder, TranscodeError, Transcoder};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\nfor out in \"$@\"; do :; done\n{}\n", body);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn transcoder(program: PathBuf) -> FfmpegTranscoder {
    FfmpegTranscoder::new(
        FfmpegRunner::new()
            .with_program(program)
            .with_timeout(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn test_transcoder_scenarios() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.mp4");
    std::fs::write(&input, b"fake video").unwrap();

    // success: one file at the output path, contractual arguments passed through
    let args_log = dir.path().join("args.txt");
    let ok = write_script(
        dir.path(),
        "ok.sh",
        &format!(
            "echo \"$@\" > {}\nprintf 'jpeg' > \"$out\"",
            args_log.display()
        ),
    );
    let output = dir.path().join("clip_thumb.jpg");
    transcoder(ok)
        .generate_derived_artifact(&input, &output)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), b"jpeg");
    let args = std::fs::read_to_string(&args_log).unwrap();
    assert!(args.contains(&format!(
        "-i {} -ss 00:00:01 -vframes 1 -q:v 2 {}",
        input.display(),
        output.display()
    )));
    std::fs::remove_file(&output).unwrap();

    // non-zero exit after writing a partial file: stderr surfaced, partial removed
    let partial = write_script(
        dir.path(),
        "partial.sh",
        "printf 'half' > \"$out\"\necho 'moov atom not found' >&2\nexit 1",
    );
    let err = transcoder(partial)
        .generate_derived_artifact(&input, &output)
        .await
        .unwrap_err();
    match &err {
        TranscodeError::Failed { exit_code, stderr } => {
            assert_eq!(*exit_code, Some(1));
            assert!(stderr.contains("moov atom not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());

    // zero exit but nothing written
    let silent = write_script(dir.path(), "silent.sh", "exit 0");
    let err = transcoder(silent)
        .generate_derived_artifact(&input, &output)
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::MissingOutput(_)));
    assert!(!output.exists());

    // hung tool is killed and its partial output discarded
    let hung = write_script(dir.path(), "hung.sh", "printf 'x' > \"$out\"\nexec sleep 30");
    let runner = FfmpegRunner::new()
        .with_program(hung)
        .with_timeout(Duration::from_millis(300));
    let err = FfmpegTranscoder::new(runner)
        .generate_derived_artifact(&input, &output)
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::Timeout(_)));
    assert!(!output.exists());

    // not executable
    let plain = dir.path().join("plain.sh");
    std::fs::write(&plain, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
    let err = transcoder(plain)
        .generate_derived_artifact(&input, &output)
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::SpawnFailed { .. }), "{err}");
}
