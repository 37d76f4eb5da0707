use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::Md5;
use paygen_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::CHUNK_SIZE;

/// Whole-file digests recorded in a payload description.
///
/// SHA-1 and SHA-256 are base64 encoded and MD5 is hex encoded, the
/// encodings update servers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadDigests {
    pub sha1_b64: String,
    pub sha256_b64: String,
    pub md5_hex: String,
    pub size: u64,
}

impl PayloadDigests {
    /// Compute all digests in a single read of `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;

        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        let mut md5 = Md5::new();
        let mut size = 0u64;
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            sha1.update(&buffer[..n]);
            sha256.update(&buffer[..n]);
            md5.update(&buffer[..n]);
            size += n as u64;
        }

        Ok(Self {
            sha1_b64: STANDARD.encode(sha1.finalize()),
            sha256_b64: STANDARD.encode(sha256.finalize()),
            md5_hex: hex::encode(md5.finalize()),
            size,
        })
    }
}
