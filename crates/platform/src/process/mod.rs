//! Process execution operations

use async_trait::async_trait;
use paygen_errors::{Error, PlatformError};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::PlatformContext;

/// Platform-specific command builder and execution
#[derive(Debug, Clone)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl PlatformCommand {
    /// Create a new platform command
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the command
    pub fn env<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Kill the command if it runs longer than `timeout`
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    #[must_use]
    pub fn get_env_vars(&self) -> &[(String, String)] {
        &self.env_vars
    }

    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Program and arguments joined by spaces, for logs and error messages
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Stdout and stderr interleaved in arrival order
    pub output: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for process execution operations
#[async_trait]
pub trait ProcessOperations: Send + Sync {
    /// Execute a command and return its exit status and combined output.
    ///
    /// A nonzero exit is not an error at this level; see [`run_checked`].
    async fn execute_command(
        &self,
        ctx: &PlatformContext,
        cmd: PlatformCommand,
    ) -> Result<CommandOutput, Error>;
}

/// Execute a command and turn a nonzero exit into `PlatformError::CommandFailed`.
///
/// # Errors
///
/// Returns whatever the process layer returns, or `CommandFailed` carrying
/// the captured output when the command exits unsuccessfully.
pub async fn run_checked(
    ops: &dyn ProcessOperations,
    ctx: &PlatformContext,
    cmd: PlatformCommand,
) -> Result<CommandOutput, Error> {
    let command = cmd.command_line();
    let output = ops.execute_command(ctx, cmd).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(PlatformError::CommandFailed {
            command,
            exit_code: output.exit_code,
            output: output.output,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(CommandOutput);

    #[async_trait]
    impl ProcessOperations for Scripted {
        async fn execute_command(
            &self,
            _ctx: &PlatformContext,
            _cmd: PlatformCommand,
        ) -> Result<CommandOutput, Error> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let mut cmd = PlatformCommand::new("delta_generator");
        cmd.arg("--major_version=2").args(["--out_file=a", "--partition_names=root:kernel"]);
        assert_eq!(
            cmd.command_line(),
            "delta_generator --major_version=2 --out_file=a --partition_names=root:kernel"
        );
    }

    #[tokio::test]
    async fn run_checked_attaches_output_on_failure() {
        let ops = Scripted(CommandOutput {
            exit_code: Some(3),
            output: "bad partition\n".into(),
        });
        let mut cmd = PlatformCommand::new("check_update_payload");
        cmd.arg("--check");

        let err = run_checked(&ops, &PlatformContext::default(), cmd)
            .await
            .unwrap_err();
        match err {
            Error::Platform(PlatformError::CommandFailed {
                command,
                exit_code,
                output,
            }) => {
                assert_eq!(command, "check_update_payload --check");
                assert_eq!(exit_code, Some(3));
                assert_eq!(output, "bad partition\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
