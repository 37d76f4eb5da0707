//! External tool execution errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors that can occur while running external tools
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlatformError {
    #[error("process execution failed: {command} - {message}")]
    ProcessExecutionFailed { command: String, message: String },

    /// The tool ran and exited unsuccessfully. `output` holds its combined
    /// stdout and stderr.
    #[error("command failed: {command} (exit code {})", display_exit_code(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("command timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },
}

#[allow(clippy::ref_option)]
fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl PlatformError {
    /// Captured output of a failed command, if any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl UserFacingError for PlatformError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotFound { .. } => {
                Some("Install the tool or point the [tools] config section at it.")
            }
            Self::CommandFailed { .. } => Some("See the payload log for the tool output."),
            Self::Timeout { .. } => Some("Raise tools.command_timeout_secs or set it to 0."),
            Self::ProcessExecutionFailed { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ProcessExecutionFailed { .. } => "platform.process_execution_failed",
            Self::CommandFailed { .. } => "platform.command_failed",
            Self::CommandNotFound { .. } => "platform.command_not_found",
            Self::Timeout { .. } => "platform.timeout",
        };
        Some(code)
    }
}
