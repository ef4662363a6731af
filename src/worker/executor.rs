//! Executor
//!
//! Runs the external transition command against a staged attempt and
//! captures both output streams in full. A non-zero exit is a normal outcome
//! (`success = false`); only failing to launch, failing to collect output or
//! running past the wall-clock budget are errors.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ConfigResult, ConfigurationError};
use crate::error::ExecutionError;
use crate::worker::fingerprint::POST_STATE_FILE;
use crate::worker::inputs::{block_file_name, PRE_STATE_FILE};

const LOG_PREVIEW_BYTES: usize = 2048;

/// Program plus leading fixed arguments, e.g. `zcli transition blocks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Split a command line on whitespace
    pub fn parse(command: &str) -> ConfigResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            ConfigurationError::invalid_value(
                "executor.command",
                command,
                "command must name a program",
            )
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Full argument list for one attempt:
    /// `<fixed…> --pre <p>/pre.ssz --post <p>/post.ssz <p>/block_0.ssz …`
    pub fn invocation_args(&self, staging_path: &Path, blocks: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push("--pre".into());
        args.push(staging_path.join(PRE_STATE_FILE).into_os_string());
        args.push("--post".into());
        args.push(staging_path.join(POST_STATE_FILE).into_os_string());
        args.extend((0..blocks).map(|i| staging_path.join(block_file_name(i)).into_os_string()));
        args
    }
}

/// Captured result of one run
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Exit status success bit
    pub success: bool,
    /// Exit code, absent when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    /// SHA-256 of the post-state, filled in by fingerprinting
    pub output_digest: Option<[u8; 32]>,
}

#[derive(Debug, Clone)]
pub struct Executor {
    template: CommandTemplate,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(template: CommandTemplate, timeout: Option<Duration>) -> Self {
        Self { template, timeout }
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub async fn run(
        &self,
        staging_path: &Path,
        blocks: u32,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut cmd = Command::new(&self.template.program);
        cmd.args(self.template.invocation_args(staging_path, blocks))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out run is cancelled by dropping the child
            .kill_on_drop(true);

        debug!(
            program = %self.template.program,
            staging_path = %staging_path.display(),
            blocks = blocks,
            "Launching transition command"
        );

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| ExecutionError::Launch {
            program: self.template.program.clone(),
            source,
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutionError::TimedOut {
                    timeout_seconds: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| ExecutionError::Capture { source })?;

        let outcome = ExecutionOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: started.elapsed(),
            output_digest: None,
        };

        debug!(
            stdout = %preview(&outcome.stdout),
            stderr = %preview(&outcome.stderr),
            "Captured transition command output"
        );

        if !outcome.success {
            warn!(
                exit_code = ?outcome.exit_code,
                duration_ms = outcome.duration.as_millis() as u64,
                "Transition command exited unsuccessfully"
            );
        }

        Ok(outcome)
    }
}

fn preview(bytes: &[u8]) -> String {
    let cut = bytes.len().min(LOG_PREVIEW_BYTES);
    let mut text = String::from_utf8_lossy(&bytes[..cut]).into_owned();
    if bytes.len() > cut {
        text.push_str(&format!("... ({} more bytes)", bytes.len() - cut));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_splits_program_and_fixed_args() {
        let template = CommandTemplate::parse("  zcli   transition blocks ").unwrap();
        assert_eq!(template.program, "zcli");
        assert_eq!(template.args, vec!["transition", "blocks"]);

        assert!(CommandTemplate::parse("   ").is_err());
    }

    #[test]
    fn test_invocation_args_layout() {
        let template = CommandTemplate::parse("zcli transition blocks").unwrap();
        let staging = PathBuf::from("/stage/k/a");
        let args = template.invocation_args(&staging, 2);

        let expected: Vec<OsString> = vec![
            "transition".into(),
            "blocks".into(),
            "--pre".into(),
            "/stage/k/a/pre.ssz".into(),
            "--post".into(),
            "/stage/k/a/post.ssz".into(),
            "/stage/k/a/block_0.ssz".into(),
            "/stage/k/a/block_1.ssz".into(),
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn test_preview_truncates() {
        let long = vec![b'x'; LOG_PREVIEW_BYTES + 10];
        let text = preview(&long);
        assert!(text.ends_with("(10 more bytes)"));
        assert_eq!(preview(b"short"), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_and_streams_are_captured() {
        let staging = tempfile::TempDir::new().unwrap();

        let ok = Executor::new(CommandTemplate::parse("echo hello").unwrap(), None);
        let outcome = ok.run(staging.path(), 0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(String::from_utf8_lossy(&outcome.stdout).starts_with("hello --pre"));

        let failing = Executor::new(CommandTemplate::parse("false").unwrap(), None);
        let outcome = failing.run(staging.path(), 0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_error() {
        let staging = tempfile::TempDir::new().unwrap();
        let executor = Executor::new(
            CommandTemplate::parse("/nonexistent/transition-tool-xyz").unwrap(),
            None,
        );
        let err = executor.run(staging.path(), 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_long_running_command() {
        let staging = tempfile::TempDir::new().unwrap();
        // `sleep` rejects the trailing arguments, so wrap it in a script
        let script = staging.path().join("slow.sh");
        std::fs::write(&script, "exec sleep 30\n").unwrap();

        let executor = Executor::new(
            CommandTemplate::parse(&format!("sh {}", script.display())).unwrap(),
            Some(Duration::from_millis(200)),
        );
        let started = Instant::now();
        let err = executor.run(staging.path(), 0).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
