//! Async subprocess runner for borg invocations.

use std::io;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::command::BorgInvocation;
use crate::exit::Disposition;
use crate::log::LogSummary;

/// Captured result of one finished tool run.
#[derive(Debug)]
pub struct BorgOutput {
    /// Raw exit code; signal-terminated children report -1.
    pub code: i32,
    /// Classified `--log-json` stderr stream.
    pub logs: LogSummary,
    /// Raw stdout, e.g. the JSON archive listing or create statistics.
    pub stdout: String,
}

impl BorgOutput {
    pub fn disposition(&self) -> Disposition {
        Disposition::from_code(self.code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to collect tool output: {0}")]
    Io(#[from] io::Error),
    #[error("interrupted while waiting for the tool")]
    Interrupted,
}

/// Run an invocation to completion, capturing both output streams.
pub async fn run(invocation: &BorgInvocation) -> Result<BorgOutput, RunError> {
    tracing::debug!(program = %invocation.program().display(), "running archiver");
    let output = invocation
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| RunError::Spawn {
            program: invocation.program().display().to_string(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(BorgOutput {
        code: output.status.code().unwrap_or(-1),
        logs: LogSummary::classify(&stderr),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

/// Run an invocation, killing the child if `cancel` fires first.
///
/// The child is placed in its own process group so a Ctrl+C aimed at the
/// caller's terminal does not reach it directly; termination goes through
/// the explicit kill below, keeping repository writes from being torn
/// mid-transaction by a stray SIGINT.
pub async fn run_cancellable(
    invocation: &BorgInvocation,
    cancel: &CancellationToken,
) -> Result<BorgOutput, RunError> {
    tracing::debug!(program = %invocation.program().display(), "running archiver (cancellable)");
    let mut command = invocation.to_command();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| RunError::Spawn {
        program: invocation.program().display().to_string(),
        source,
    })?;

    // Drain both pipes concurrently while waiting; draining only after exit
    // deadlocks once the child fills a pipe buffer.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let drain = tokio::spawn(async move {
        let read_stdout = async {
            let mut buf = String::new();
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        };
        let read_stderr = async {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        };
        tokio::join!(read_stdout, read_stderr)
    });

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    match waited {
        Some(status) => {
            let status = status?;
            let (stdout, stderr) = drain.await.unwrap_or_default();
            Ok(BorgOutput {
                code: status.code().unwrap_or(-1),
                logs: LogSummary::classify(&stderr),
                stdout,
            })
        }
        None => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            drain.abort();
            Err(RunError::Interrupted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Borg;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fake_tool(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("borg");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn clean_run_has_clean_disposition() {
        let dir = TempDir::new().unwrap();
        let exe = fake_tool(&dir, r#"echo '{"archives": []}'; exit 0"#);
        let output = run(&Borg::new().with_exe(exe).list("/repo")).await.unwrap();
        assert_eq!(output.disposition(), Disposition::Clean);
        assert!(output.logs.errors.is_empty());
        assert_eq!(output.stdout.trim(), r#"{"archives": []}"#);
    }

    #[tokio::test]
    async fn warning_run_collects_warnings() {
        let dir = TempDir::new().unwrap();
        let exe = fake_tool(
            &dir,
            r#"echo '{"levelname": "WARNING", "message": "slow"}' >&2; exit 1"#,
        );
        let output = run(&Borg::new().with_exe(exe).list("/repo")).await.unwrap();
        assert_eq!(output.disposition(), Disposition::Warnings);
        assert_eq!(output.logs.warnings.len(), 1);
    }

    #[tokio::test]
    async fn failed_run_flags_missing_repository() {
        let dir = TempDir::new().unwrap();
        let exe = fake_tool(
            &dir,
            r#"echo '{"levelname": "ERROR", "msgid": "Repository.DoesNotExist", "message": "gone"}' >&2; exit 2"#,
        );
        let output = run(&Borg::new().with_exe(exe).list("/repo")).await.unwrap();
        assert_eq!(output.disposition(), Disposition::Failure);
        assert!(output.logs.repository_missing);
    }

    #[tokio::test]
    async fn unexpected_exit_code_is_invocation_failure() {
        let dir = TempDir::new().unwrap();
        let exe = fake_tool(&dir, "exit 77");
        let output = run(&Borg::new().with_exe(exe).list("/repo")).await.unwrap();
        assert_eq!(output.disposition(), Disposition::Invocation(77));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let invocation = Borg::new().with_exe("/nonexistent/borg").list("/repo");
        assert!(matches!(
            run(&invocation).await,
            Err(RunError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let dir = TempDir::new().unwrap();
        let exe = fake_tool(&dir, "sleep 30");
        let cancel = CancellationToken::new();
        let invocation = Borg::new().with_exe(exe).list("/repo");

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = run_cancellable(&invocation, &cancel).await;
        assert!(matches!(result, Err(RunError::Interrupted)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
