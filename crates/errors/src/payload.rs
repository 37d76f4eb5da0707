//! Payload generation errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PayloadError {
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// The payload checker rejected the generated payload.
    #[error("payload verification failed")]
    VerificationFailed { output: String },

    #[error("metadata size file missing: {path}")]
    MetadataSizeMissing { path: String },

    #[error("invalid metadata size {value:?}")]
    InvalidMetadataSize { value: String },

    #[error("payload has no destination URI")]
    MissingUri,
}

impl UserFacingError for PayloadError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPayload { .. } => {
                Some("A delta needs a source and target of the same image family.")
            }
            Self::VerificationFailed { .. } => Some("See the payload log for checker output."),
            Self::MissingUri => Some("Pass --output or set the payload URI."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidPayload { .. } => "payload.invalid",
            Self::VerificationFailed { .. } => "payload.verification_failed",
            Self::MetadataSizeMissing { .. } => "payload.metadata_size_missing",
            Self::InvalidMetadataSize { .. } => "payload.invalid_metadata_size",
            Self::MissingUri => "payload.missing_uri",
        };
        Some(code)
    }
}
