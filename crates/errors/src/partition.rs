//! Disk image and partition table errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PartitionError {
    #[error("partition {name} not found in {image}")]
    PartitionNotFound { image: String, name: String },

    #[error("invalid partition table in {image}: {message}")]
    InvalidPartitionTable { image: String, message: String },

    #[error("partition {name} does not hold an ext filesystem: {message}")]
    InvalidFilesystem { name: String, message: String },
}

impl UserFacingError for PartitionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PartitionNotFound { .. } | Self::InvalidPartitionTable { .. } => {
                Some("Make sure the image is a full disk image, not an archive or module.")
            }
            Self::InvalidFilesystem { .. } => {
                Some("Extract the root partition without truncation.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::PartitionNotFound { .. } => "partition.not_found",
            Self::InvalidPartitionTable { .. } => "partition.invalid_table",
            Self::InvalidFilesystem { .. } => "partition.invalid_filesystem",
        };
        Some(code)
    }
}
