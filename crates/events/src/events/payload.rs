use serde::{Deserialize, Serialize};
use std::fmt;

use super::FailureContext;

/// Pipeline step of a single payload run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStage {
    FetchImages,
    ExtractPartitions,
    GenerateUnsigned,
    GenerateHashes,
    SignHashes,
    InsertSignatures,
    StoreMetadataSignature,
    DescribePayload,
    Verify,
    Upload,
}

impl PayloadStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchImages => "fetch_images",
            Self::ExtractPartitions => "extract_partitions",
            Self::GenerateUnsigned => "generate_unsigned",
            Self::GenerateHashes => "generate_hashes",
            Self::SignHashes => "sign_hashes",
            Self::InsertSignatures => "insert_signatures",
            Self::StoreMetadataSignature => "store_metadata_signature",
            Self::DescribePayload => "describe_payload",
            Self::Verify => "verify",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for PayloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload generation lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PayloadEvent {
    /// Run accepted, work directory created
    RunStarted {
        payload: String,
        delta: bool,
        work_dir: String,
    },

    /// Waiting for a generator slot
    WaitingForSlot { payload: String, available: usize },

    StageStarted {
        payload: String,
        stage: PayloadStage,
    },

    StageCompleted {
        payload: String,
        stage: PayloadStage,
        duration_ms: u64,
    },

    /// Payload and sidecars are at their destination
    Uploaded {
        payload: String,
        uri: String,
        size: u64,
    },

    /// Payload already exists at its destination and was not regenerated
    Skipped { payload: String, uri: String },

    Failed {
        payload: String,
        stage: PayloadStage,
        failure: FailureContext,
    },
}
