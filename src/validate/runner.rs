// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Async wrapper around the external `maid` validator CLI.
//!
//! Each validation is one subprocess:
//!
//! ```text
//! maid validate <path> --validation-mode <mode> --use-manifest-chain --json-output
//! ```
//!
//! A non-zero exit with parseable JSON on stdout is a normal, error-bearing
//! result — the validator signals "validation failed" through its payload,
//! not through its exit code. Everything else maps to a typed [`RunnerError`].
//!
//! Cancellation is by dropping the future: the child is spawned with
//! `kill_on_drop`, so aborting the owning task terminates the subprocess
//! without leaking a handle.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{RawOutput, ValidationMode};

/// A typed pipeline failure, distinct from validator-reported issues.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The subprocess exceeded its deadline and was terminated.
    #[error("validator timed out after {0:?}")]
    Timeout(Duration),

    /// The validator command could not be spawned at all.
    #[error("failed to spawn validator '{command}': {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failed while waiting for the subprocess.
    #[error("validator I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Non-zero exit with output that is not the expected JSON document.
    #[error("validator exited with status {code:?}: {stderr}")]
    Process {
        /// The exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// Zero exit but stdout was not the expected JSON document.
    #[error("validator produced malformed output: {0}")]
    MalformedOutput(#[source] serde_json::Error),
}

/// Invokes the validator CLI for one document at a time.
#[derive(Debug, Clone)]
pub struct MaidRunner {
    command: PathBuf,
    timeout: Duration,
}

impl MaidRunner {
    /// Creates a runner for the given command with the given per-call timeout.
    #[must_use]
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Runs one validation of `manifest_path` in `mode`.
    ///
    /// # Errors
    ///
    /// Returns a [`RunnerError`] for timeouts, spawn failures, I/O errors,
    /// and unparseable output. Validator-reported issues are **not** errors.
    pub async fn validate(
        &self,
        manifest_path: &Path,
        mode: ValidationMode,
    ) -> Result<RawOutput, RunnerError> {
        debug!(
            "Validating {} (mode: {})",
            manifest_path.display(),
            mode.as_str()
        );

        let child = Command::new(&self.command)
            .arg("validate")
            .arg(manifest_path)
            .arg("--validation-mode")
            .arg(mode.as_str())
            .arg("--use-manifest-chain")
            .arg("--json-output")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: self.command.display().to_string(),
                source,
            })?;

        // On timeout the Elapsed branch drops the wait future, which drops
        // the child; kill_on_drop terminates the subprocess.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RunnerError::Io(e)),
            Err(_) => return Err(RunnerError::Timeout(self.timeout)),
        };

        trace!(
            "Validator exited with {:?}, {} bytes of stdout",
            output.status.code(),
            output.stdout.len()
        );

        match serde_json::from_slice::<RawOutput>(&output.stdout) {
            Ok(raw) => Ok(raw),
            // Clean exit but garbage on stdout: the validator itself is broken
            Err(e) if output.status.success() => Err(RunnerError::MalformedOutput(e)),
            // Crash without a parseable payload: surface stderr
            Err(_) => Err(RunnerError::Process {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Tests use unwrap/panic for clear failure messages"
)]
mod tests {
    use super::*;
    use std::io::Write;

    fn runner(command: &str, timeout_ms: u64) -> MaidRunner {
        MaidRunner::new(command, Duration::from_millis(timeout_ms))
    }

    /// Writes a one-line shell script that plays the validator's part.
    fn fake_validator(body: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .prefix("fake-maid-")
            .tempfile()
            .unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let path = file.into_temp_path();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn spawn_failure_is_typed() {
        let runner = runner("/nonexistent/maid-validator", 1_000);
        let result = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::FullChain)
            .await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_output_parses() {
        let script = fake_validator(r#"echo '{"success": true, "errors": [], "warnings": []}'"#);
        let runner = MaidRunner::new(&*script, Duration::from_secs(5));
        let raw = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::Schema)
            .await
            .unwrap();
        assert!(raw.success);
        assert!(raw.errors.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_with_json_is_a_normal_result() {
        let script = fake_validator(
            r#"echo '{"success": false, "errors": [{"code": "MAID-002", "message": "m"}]}'; exit 1"#,
        );
        let runner = MaidRunner::new(&*script, Duration::from_secs(5));
        let raw = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::FullChain)
            .await
            .unwrap();
        assert!(!raw.success);
        assert_eq!(raw.errors.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_without_json_carries_stderr() {
        let script = fake_validator(r#"echo "boom" >&2; exit 2"#);
        let runner = MaidRunner::new(&*script, Duration::from_secs(5));
        let result = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::FullChain)
            .await;
        match result {
            Err(RunnerError::Process { code, stderr }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Process error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_with_garbage_is_malformed_output() {
        let script = fake_validator(r"echo 'this is not json'");
        let runner = MaidRunner::new(&*script, Duration::from_secs(5));
        let result = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::FullChain)
            .await;
        assert!(matches!(result, Err(RunnerError::MalformedOutput(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_terminates_and_reports() {
        let script = fake_validator(r"sleep 30");
        let runner = MaidRunner::new(&*script, Duration::from_millis(100));
        let start = std::time::Instant::now();
        let result = runner
            .validate(Path::new("/tmp/x.manifest.json"), ValidationMode::FullChain)
            .await;
        assert!(matches!(result, Err(RunnerError::Timeout(_))));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timeout must not wait for the child's natural exit"
        );
    }
}
