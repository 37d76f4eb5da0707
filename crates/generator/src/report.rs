//! Results of payload runs

use chrono::{DateTime, Utc};
use paygen_errors::Error;
use serde::Serialize;

use crate::description::PayloadDescription;

/// Outcome of one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Human readable payload name
    pub payload: String,
    /// Where the payload was published
    pub uri: String,
    pub delta: bool,
    pub signed: bool,
    pub verified: bool,
    pub size: u64,
    pub metadata_size: u64,
    pub description: PayloadDescription,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Outcome of a batch of independent runs.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<RunReport>,
    /// Payloads already published, by URI
    pub skipped: Vec<String>,
    /// Payloads that failed, by name, with the error that stopped them
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
