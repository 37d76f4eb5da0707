//! External process execution events

use serde::{Deserialize, Serialize};

/// Events emitted around external tool invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Process spawned
    ProcessStarted {
        /// Program name
        command: String,
        /// Arguments as passed
        args: Vec<String>,
        /// Working directory if overridden
        cwd: Option<String>,
    },

    /// Process exited with status zero
    ProcessCompleted {
        command: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },

    /// Process could not be spawned, timed out, or exited non-zero
    ProcessFailed {
        command: String,
        exit_code: Option<i32>,
        error_message: String,
        duration_ms: u64,
    },
}
