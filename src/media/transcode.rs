//! External transcoder invocation.
//!
//! Success is decided only by the exit status; stderr is kept for diagnostics.
//! Nothing here returns an error: spawn failures and cancellation are reported
//! as failed outcomes.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_FFMPEG_BINARY;

/// Flags prepended to every invocation: overwrite output, no banner, errors only.
pub const BASE_ARGS: [&str; 4] = ["-y", "-hide_banner", "-loglevel", "error"];

/// Result of one transcoder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    pub success: bool,
    /// Captured stderr, or the error text when the process could not run
    pub diagnostics: String,
}

impl TranscodeOutcome {
    pub fn success(diagnostics: impl Into<String>) -> Self {
        Self {
            success: true,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failure(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Capability to run the transcoder with operation-specific arguments.
#[async_trait]
pub trait TranscodeRunner: Send + Sync {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> TranscodeOutcome;
}

/// Runs an ffmpeg binary as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_BINARY)
    }
}

#[async_trait]
impl TranscodeRunner for FfmpegRunner {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> TranscodeOutcome {
        debug!("running {} {}", self.binary.display(), args.join(" "));

        let child = Command::new(&self.binary)
            .args(BASE_ARGS)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) => return TranscodeOutcome::failure(err.to_string()),
        };

        // Dropping the output future on cancellation kills the child.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => TranscodeOutcome::failure("transcode cancelled"),
            output = child.wait_with_output() => match output {
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                    if output.status.success() {
                        TranscodeOutcome::success(stderr)
                    } else if stderr.trim().is_empty() {
                        TranscodeOutcome::failure(format!("transcoder exited with {}", output.status))
                    } else {
                        TranscodeOutcome::failure(stderr)
                    }
                }
                Err(err) => TranscodeOutcome::failure(err.to_string()),
            },
        }
    }
}
