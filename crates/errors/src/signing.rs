//! Signing error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SigningError {
    /// The backend returned results that break the hash/keyset/size contract.
    #[error("unexpected signer results: {message}")]
    UnexpectedSignerResults { message: String },

    #[error("signer failed: {message}")]
    SignerFailed { message: String },

    #[error("private key not found: {path}")]
    KeyNotFound { path: String },

    #[error("public key unavailable: {reason}")]
    PublicKeyUnavailable { reason: String },

    #[error("signing request {ticket} timed out after {seconds}s")]
    Timeout { ticket: String, seconds: u64 },
}

impl UserFacingError for SigningError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::KeyNotFound { .. } => Some("Pass an existing private key with --private-key."),
            Self::PublicKeyUnavailable { .. } => {
                Some("Set signing.public_key_uri to verify remotely signed payloads.")
            }
            Self::Timeout { .. } => Some("Check the signing service and retry."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnexpectedSignerResults { .. } => "signing.unexpected_results",
            Self::SignerFailed { .. } => "signing.signer_failed",
            Self::KeyNotFound { .. } => "signing.key_not_found",
            Self::PublicKeyUnavailable { .. } => "signing.public_key_unavailable",
            Self::Timeout { .. } => "signing.timeout",
        };
        Some(code)
    }
}
