#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Payload signing backends
//!
//! A signer turns payload and metadata hashes into signatures, one per
//! requested keyset, and can hand out the public key needed to verify them.
//! Official builds go through the remote ticket-based signer; everything else
//! is signed locally with a private key.

mod local;
mod remote;

pub use local::LocalSigner;
pub use remote::RemoteSigner;

use async_trait::async_trait;
use paygen_errors::{Error, SigningError};
use std::path::Path;

/// Signatures for one hash, in keyset order
pub type HashSignatures = Vec<Vec<u8>>;

/// Something that can sign payload hashes.
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    /// Short name used in events and logs
    fn name(&self) -> &'static str;

    /// Sign every hash under every keyset.
    ///
    /// The result has one entry per hash, each holding one signature per
    /// keyset in the order given.
    async fn sign_hashes(
        &self,
        hashes: &[Vec<u8>],
        keysets: &[String],
    ) -> Result<Vec<HashSignatures>, Error>;

    /// Write the PEM public key matching the signing key to `out`.
    async fn extract_public_key(&self, out: &Path) -> Result<(), Error>;
}

fn unexpected(message: String) -> Error {
    SigningError::UnexpectedSignerResults { message }.into()
}

/// Check signer output against what was asked for.
///
/// `expected_sizes` holds the signature length for each keyset, so its length
/// is also the number of signatures every hash must have.
///
/// # Errors
///
/// Returns `SigningError::UnexpectedSignerResults` describing the first
/// mismatch found.
pub fn validate_signer_results(
    results: &[HashSignatures],
    hash_count: usize,
    expected_sizes: &[usize],
) -> Result<(), Error> {
    if results.len() != hash_count {
        return Err(unexpected(format!(
            "expected {hash_count} hash results, got {}",
            results.len()
        )));
    }

    for (i, signatures) in results.iter().enumerate() {
        if signatures.len() != expected_sizes.len() {
            return Err(unexpected(format!(
                "hash {i}: expected {} signatures, got {}",
                expected_sizes.len(),
                signatures.len()
            )));
        }
        for (k, (signature, &size)) in signatures.iter().zip(expected_sizes).enumerate() {
            if signature.len() != size {
                return Err(unexpected(format!(
                    "hash {i} keyset {k}: expected {size} byte signature, got {}",
                    signature.len()
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigs(sizes: &[usize]) -> HashSignatures {
        sizes.iter().map(|&n| vec![0u8; n]).collect()
    }

    #[test]
    fn well_formed_results_pass() {
        let results = vec![sigs(&[256]), sigs(&[256])];
        validate_signer_results(&results, 2, &[256]).unwrap();
    }

    #[test]
    fn multiple_keysets_are_checked_in_order() {
        let results = vec![sigs(&[256, 512])];
        validate_signer_results(&results, 1, &[256, 512]).unwrap();
        assert!(validate_signer_results(&results, 1, &[512, 256]).is_err());
    }

    #[test]
    fn wrong_hash_count_is_rejected() {
        let err = validate_signer_results(&[sigs(&[256])], 2, &[256]).unwrap_err();
        assert!(err.is_signer_contract_violation());
    }

    #[test]
    fn missing_keyset_signature_is_rejected() {
        let results = vec![sigs(&[256]), sigs(&[])];
        let err = validate_signer_results(&results, 2, &[256]).unwrap_err();
        assert!(err.is_signer_contract_violation());
    }

    #[test]
    fn short_signature_is_rejected() {
        let results = vec![sigs(&[256]), sigs(&[255])];
        let err = validate_signer_results(&results, 2, &[256]).unwrap_err();
        assert!(err.to_string().contains("hash 1"));
    }
}
