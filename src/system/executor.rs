// EN: src/system/executor.rs

use crate::{CancellationToken, constants::SCRIPT_FLAG};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long a killed child's pipes may stay open before its output is abandoned.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("'{}' could not be executed: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    NonZeroExitStatus(ExitStatus),
    #[error("terminated by service shutdown ({0})")]
    Cancelled(ExitStatus),
    #[error("failed to collect process output: {0}")]
    Io(#[from] io::Error),
}

/// Everything a finished interpreter produced.
#[derive(Debug)]
pub struct ScriptOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
    cancelled: bool,
}

impl ScriptOutput {
    /// The error to report for this run, if it did not exit successfully.
    pub fn exit_error(&self) -> Option<ExecutionError> {
        if self.cancelled {
            Some(ExecutionError::Cancelled(self.status))
        } else if !self.status.success() {
            Some(ExecutionError::NonZeroExitStatus(self.status))
        } else {
            None
        }
    }
}

/// Runs `program -l <script>` and captures stdout and stderr in full.
///
/// The child sees *only* `exports` in its environment; nothing is inherited from
/// this process. Standard input is `/dev/null`.
///
/// If `cancellation_token` fires while the child is running, the child is killed
/// and the output read up to that point is returned; `exit_error` then reports
/// `ExecutionError::Cancelled`.
///
/// # Errors
/// `ExecutionError::Spawn` if the process could not be started at all, which includes
/// a `cancellation_token` that has already fired, or `ExecutionError::Io` if waiting
/// on it or draining its pipes failed.
pub async fn run_script(
    program: &Path,
    script: &Path,
    exports: &BTreeMap<String, String>,
    cancellation_token: &CancellationToken,
) -> Result<ScriptOutput, ExecutionError> {
    if cancellation_token.is_cancelled() {
        return Err(ExecutionError::Spawn {
            program: program.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Interrupted, "service is shutting down"),
        });
    }

    let mut child = Command::new(program)
        .arg(SCRIPT_FLAG)
        .arg(script)
        .env_clear()
        .envs(exports)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    // Both pipes are drained concurrently so a chatty stderr can't stall the child.
    let stdout_task = drain(child.stdout.take());
    let stderr_task = drain(child.stderr.take());

    let finished = tokio::select! {
        status = child.wait() => Some(status?),
        () = cancellation_token.cancelled() => None,
    };

    let cancelled = finished.is_none();
    let status = match finished {
        Some(status) => status,
        None => {
            log::debug!(
                "Cancellation requested, killing child process (PID: {:?})...",
                child.id()
            );
            if let Err(e) = child.start_kill() {
                log::warn!("Failed to kill child process {:?}: {}", child.id(), e);
            }
            child.wait().await?
        }
    };

    // A grandchild can outlive a killed shell and keep the pipes open.
    let (stdout, stderr) = if cancelled {
        (
            collect_within(stdout_task, CANCEL_GRACE).await,
            collect_within(stderr_task, CANCEL_GRACE).await,
        )
    } else {
        (collect(stdout_task).await?, collect(stderr_task).await?)
    };

    Ok(ScriptOutput {
        stdout,
        stderr,
        status,
        cancelled,
    })
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(task: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    task.await.map_err(io::Error::other)?
}

async fn collect_within(mut task: JoinHandle<io::Result<Vec<u8>>>, grace: Duration) -> Vec<u8> {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(Ok(buf))) => buf,
        Ok(_) => Vec::new(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn script(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr_separately() {
        let file = script("echo out\necho err 1>&2\necho more\n");
        let output = run_script(&sh(), file.path(), &BTreeMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.stdout, b"out\nmore\n");
        assert_eq!(output.stderr, b"err\n");
        assert!(output.status.success());
        assert!(output.exit_error().is_none());
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let file = script("echo partial\nexit 7\n");
        let output = run_script(&sh(), file.path(), &BTreeMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.stdout, b"partial\n");
        assert_eq!(output.status.code(), Some(7));
        assert!(matches!(
            output.exit_error(),
            Some(ExecutionError::NonZeroExitStatus(_))
        ));
    }

    #[tokio::test]
    async fn test_environment_is_exactly_the_exports() {
        // --- Setup ---
        let mut exports = BTreeMap::new();
        exports.insert("FOO".to_string(), "bar".to_string());
        let file = script("echo \"FOO=$FOO\"\necho \"HOME=${HOME:-unset}\"\n");

        // --- Execute ---
        let output = run_script(&sh(), file.path(), &exports, &CancellationToken::new())
            .await
            .unwrap();

        // --- Assert ---
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert!(stdout.contains("FOO=bar\n"));
        assert!(stdout.contains("HOME=unset\n"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let file = script("true\n");
        let result = run_script(
            Path::new("/nonexistent/relay-shell"),
            file.path(),
            &BTreeMap::new(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_refuses_to_start() {
        let file = script("echo should-not-run\n");
        let token = CancellationToken::new();
        token.cancel();

        let result = run_script(&sh(), file.path(), &BTreeMap::new(), &token).await;

        assert!(matches!(
            &result,
            Err(ExecutionError::Spawn { program, source })
                if *program == sh() && source.kind() == io::ErrorKind::Interrupted
        ));
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        // `exec` so the kill lands on the process holding the pipes.
        let file = script("echo started\nexec sleep 30\n");
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let output = tokio::time::timeout(
            Duration::from_secs(10),
            run_script(&sh(), file.path(), &BTreeMap::new(), &token),
        )
        .await
        .expect("cancelled script should not run to completion")
        .unwrap();

        assert!(matches!(
            output.exit_error(),
            Some(ExecutionError::Cancelled(_))
        ));
        assert_eq!(output.stdout, b"started\n");
    }
}
