//! Native process operations implementation
//!
//! Spawns tools with `tokio::process`, collects stdout and stderr into one
//! buffer as lines arrive, and enforces the optional per-command timeout.

use async_trait::async_trait;
use paygen_errors::{Error, PlatformError};
use paygen_events::EventEmitter;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::core::PlatformContext;
use crate::process::{CommandOutput, PlatformCommand, ProcessOperations};

/// Host implementation of process operations
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessOperations;

impl NativeProcessOperations {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Read both pipes to EOF, appending each line to one buffer in arrival order.
async fn collect_interleaved<O, E>(stdout: O, stderr: E) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let mut out_line = Vec::new();
    let mut err_line = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut combined = Vec::new();

    // Partial reads stay in the line buffers across select iterations.
    while !(out_done && err_done) {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_line), if !out_done => {
                if read? == 0 {
                    out_done = true;
                }
                combined.append(&mut out_line);
            }
            read = err_reader.read_until(b'\n', &mut err_line), if !err_done => {
                if read? == 0 {
                    err_done = true;
                }
                combined.append(&mut err_line);
            }
        }
    }

    Ok(combined)
}

async fn run(cmd: &PlatformCommand) -> Result<CommandOutput, PlatformError> {
    let program = cmd.program().to_string();
    let spawn_error = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PlatformError::CommandNotFound {
                command: program.clone(),
            }
        } else {
            PlatformError::ProcessExecutionFailed {
                command: program.clone(),
                message: e.to_string(),
            }
        }
    };

    let mut command = Command::new(cmd.program());
    command
        .args(cmd.get_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cmd.get_current_dir() {
        command.current_dir(dir);
    }

    for (key, value) in cmd.get_env_vars() {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(spawn_error)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        return Err(PlatformError::ProcessExecutionFailed {
            command: program,
            message: "child pipes were not captured".to_string(),
        });
    };

    let finish = async {
        let output = collect_interleaved(stdout, stderr).await?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, output))
    };

    let joined = if let Some(limit) = cmd.get_timeout() {
        let timed = tokio::time::timeout(limit, finish).await;
        if let Ok(joined) = timed {
            joined
        } else {
            let _ = child.kill().await;
            return Err(PlatformError::Timeout {
                command: cmd.command_line(),
                seconds: limit.as_secs(),
            });
        }
    } else {
        finish.await
    };

    let (status, output) = joined.map_err(|e| PlatformError::ProcessExecutionFailed {
        command: program.clone(),
        message: e.to_string(),
    })?;

    Ok(CommandOutput {
        exit_code: status.code(),
        output: String::from_utf8_lossy(&output).into_owned(),
    })
}

#[async_trait]
impl ProcessOperations for NativeProcessOperations {
    async fn execute_command(
        &self,
        ctx: &PlatformContext,
        cmd: PlatformCommand,
    ) -> Result<CommandOutput, Error> {
        let start = Instant::now();
        ctx.emit_process_started(cmd.program(), cmd.get_args(), cmd.get_current_dir());
        tracing::debug!(command = %cmd.command_line(), "running external tool");

        let result = run(&cmd).await;
        let duration = start.elapsed();

        match &result {
            Ok(output) if output.success() => {
                ctx.emit_process_completed(cmd.program(), output.exit_code, duration);
            }
            Ok(output) => {
                ctx.emit_process_failed(
                    cmd.program(),
                    output.exit_code,
                    "nonzero exit status",
                    duration,
                );
            }
            Err(e) => {
                ctx.emit_process_failed(cmd.program(), None, e.to_string(), duration);
            }
        }

        result.map_err(Error::from)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> PlatformCommand {
        let mut cmd = PlatformCommand::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let ops = NativeProcessOperations::new();
        let output = ops
            .execute_command(&PlatformContext::default(), sh("echo out; echo err 1>&2"))
            .await
            .unwrap();
        assert!(output.success());
        assert!(output.output.contains("out\n"));
        assert!(output.output.contains("err\n"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let ops = NativeProcessOperations::new();
        let output = ops
            .execute_command(&PlatformContext::default(), sh("echo nope; exit 7"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(7));
        assert_eq!(output.output, "nope\n");
    }

    #[tokio::test]
    async fn missing_program_is_command_not_found() {
        let ops = NativeProcessOperations::new();
        let err = ops
            .execute_command(
                &PlatformContext::default(),
                PlatformCommand::new("paygen-definitely-not-installed"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Platform(PlatformError::CommandNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let ops = NativeProcessOperations::new();
        let mut cmd = sh("sleep 5");
        cmd.timeout(Some(Duration::from_millis(100)));
        let err = ops
            .execute_command(&PlatformContext::default(), cmd)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Platform(PlatformError::Timeout { .. })));
    }

    #[tokio::test]
    async fn honours_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ops = NativeProcessOperations::new();
        let mut cmd = sh("pwd");
        cmd.current_dir(dir.path());
        let output = ops
            .execute_command(&PlatformContext::default(), cmd)
            .await
            .unwrap();
        let reported = std::path::PathBuf::from(output.output.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
