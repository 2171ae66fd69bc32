use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::phase::ProcessInvocation;
use crate::{DriverError, Result};

// ─── ProcessOutcome ───────────────────────────────────────────────────────

/// What a finished phase left behind: its exit code and every line it
/// printed, in order, per stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr joined back into a single block for error messages.
    pub fn stderr_text(&self) -> String {
        self.stderr_lines.join("\n")
    }
}

// ─── ToolRunner ───────────────────────────────────────────────────────────

/// Runs one [`ProcessInvocation`] to completion.
///
/// `on_stdout` is called for every stdout line as it arrives so callers can
/// extract data while the process is still running. Implementations resolve
/// on process exit with the exit code, whatever it is; a non-zero exit is
/// not an `Err`. `Err` is reserved for the process never starting or its
/// pipes failing.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &ProcessInvocation,
        on_stdout: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ProcessOutcome>;
}

// ─── ProcessRunner ────────────────────────────────────────────────────────

/// Spawns the real binary with `tokio::process`.
///
/// The child is never killed by the runner: once spawned it runs until it
/// exits on its own or receives an external signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &ProcessInvocation,
        on_stdout: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ProcessOutcome> {
        let mut cmd = Command::new(&invocation.command);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_directory)
            // Suppresses terraform's "next steps" hints meant for humans.
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(
            phase = %invocation.phase,
            cwd = %invocation.working_directory.display(),
            "running {}",
            invocation.display_masked()
        );

        let mut child = cmd.spawn().map_err(|source| DriverError::Spawn {
            command: invocation.command.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Capture("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Capture("stderr not captured".into()))?;

        // stderr is drained on its own task while stdout is read here.
        let phase = invocation.phase;
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut collected = Vec::new();
            loop {
                match read_line_lossy(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        tracing::debug!(%phase, stream = "stderr", "{line}");
                        collected.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(%phase, error = %e, "stderr read failed");
                        break;
                    }
                }
            }
            collected
        });

        let mut stdout_lines = Vec::new();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let read_error = loop {
            match read_line_lossy(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    tracing::debug!(%phase, stream = "stdout", "{line}");
                    on_stdout(&line);
                    stdout_lines.push(line);
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };
        // Closes our end of the pipe so the child cannot block on it.
        drop(reader);

        let status = child.wait().await?;
        let stderr_lines = stderr_task
            .await
            .map_err(|e| DriverError::Capture(format!("stderr reader failed: {e}")))?;
        if let Some(e) = read_error {
            return Err(DriverError::Io(e));
        }

        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(%phase, exit_code, "phase finished");

        Ok(ProcessOutcome {
            exit_code,
            stdout_lines,
            stderr_lines,
        })
    }
}

/// Next line without its terminator. Bytes that are not UTF-8 are replaced
/// rather than failing the read; terraform relays provider output verbatim.
async fn read_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use std::path::Path;
    use tempfile::TempDir;

    fn shell(script: &str, cwd: &Path) -> ProcessInvocation {
        ProcessInvocation {
            phase: Phase::Apply,
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_directory: cwd.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn collects_both_streams_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let inv = shell("echo out-1; echo err-1 1>&2; echo out-2; exit 3", dir.path());
        let outcome = ProcessRunner.run(&inv, &mut |_| {}).await.unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert_eq!(outcome.stdout_lines, vec!["out-1", "out-2"]);
        assert_eq!(outcome.stderr_lines, vec!["err-1"]);
        assert_eq!(outcome.stderr_text(), "err-1");
    }

    #[tokio::test]
    async fn streams_stdout_lines_to_callback_in_order() {
        let dir = TempDir::new().unwrap();
        let inv = shell("printf 'a\\nb\\nc\\n'", dir.path());
        let mut seen = Vec::new();
        let outcome = ProcessRunner
            .run(&inv, &mut |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(seen, outcome.stdout_lines);
    }

    #[tokio::test]
    async fn runs_in_the_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let inv = shell("cat marker.txt", dir.path());
        let outcome = ProcessRunner.run(&inv, &mut |_| {}).await.unwrap();
        assert_eq!(outcome.stdout_lines, vec!["here"]);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_abort_the_phase() {
        let dir = TempDir::new().unwrap();
        let inv = shell(
            "printf 'caf\\351\\n'; printf 'bad \\377 err\\n' 1>&2; echo Outputs:; echo 'manager_ip = 1.2.3.4'; echo err-2 1>&2; exit 0",
            dir.path(),
        );
        let mut seen = Vec::new();
        let outcome = ProcessRunner
            .run(&inv, &mut |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout_lines.len(), 3);
        assert_eq!(outcome.stdout_lines[0], "caf\u{FFFD}");
        assert_eq!(outcome.stdout_lines[2], "manager_ip = 1.2.3.4");
        assert_eq!(seen, outcome.stdout_lines);
        assert_eq!(outcome.stderr_lines, vec!["bad \u{FFFD} err", "err-2"]);
    }

    #[tokio::test]
    async fn crlf_terminators_are_trimmed() {
        let dir = TempDir::new().unwrap();
        let inv = shell("printf 'a\\r\\nb'", dir.path());
        let outcome = ProcessRunner.run(&inv, &mut |_| {}).await.unwrap();
        assert_eq!(outcome.stdout_lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let inv = ProcessInvocation::init("__nonexistent_terraform_xyz__", dir.path());
        let err = ProcessRunner.run(&inv, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, DriverError::Spawn { .. }));
        assert!(err.to_string().contains("__nonexistent_terraform_xyz__"));
    }
}
