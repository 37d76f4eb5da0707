//! Payload description document published as `<payload>.json`

use paygen_config::constants::DESCRIPTION_FILE_VERSION;
use paygen_errors::{Error, StorageError};
use paygen_hash::PayloadDigests;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hashes and metadata of a final payload.
///
/// Despite their names the `sha*_hex` fields hold base64 digests; update
/// servers read them that way. Bump [`DESCRIPTION_FILE_VERSION`] whenever the
/// shape changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadDescription {
    pub version: u32,
    pub sha1_hex: String,
    pub sha256_hex: String,
    pub md5_hex: String,
    pub metadata_size: u64,
    pub metadata_signature: Option<String>,
}

impl PayloadDescription {
    #[must_use]
    pub fn new(
        digests: &PayloadDigests,
        metadata_size: u64,
        metadata_signature: Option<String>,
    ) -> Self {
        Self {
            version: DESCRIPTION_FILE_VERSION,
            sha1_hex: digests.sha1_b64.clone(),
            sha256_hex: digests.sha256_b64.clone(),
            md5_hex: digests.md5_hex.clone(),
            metadata_size,
            metadata_signature,
        }
    }

    /// Serialized form with keys in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        // serde_json's default map is ordered by key.
        let value = serde_json::to_value(self)
            .map_err(|e| Error::internal(format!("serializing description: {e}")))?;
        serde_json::to_string(&value)
            .map_err(|e| Error::internal(format!("serializing description: {e}")))
    }

    /// Write the document to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn write(&self, path: &Path) -> Result<(), Error> {
        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digests() -> PayloadDigests {
        PayloadDigests {
            sha1_b64: "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=".into(),
            sha256_b64: "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=".into(),
            md5_hex: "900150983cd24fb0d6963f7d28e17f72".into(),
            size: 3,
        }
    }

    #[test]
    fn keys_are_sorted_and_unsigned_signature_is_null() {
        let json = PayloadDescription::new(&digests(), 0, None).to_json().unwrap();
        assert_eq!(
            json,
            "{\"md5_hex\":\"900150983cd24fb0d6963f7d28e17f72\",\
             \"metadata_signature\":null,\
             \"metadata_size\":0,\
             \"sha1_hex\":\"qZk+NkcGgWq6PiVxeFDCbJzQ2J0=\",\
             \"sha256_hex\":\"ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=\",\
             \"version\":2}"
        );
    }

    #[tokio::test]
    async fn written_document_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delta.json");
        let description = PayloadDescription::new(&digests(), 4321, Some("c2ln".into()));
        description.write(&path).await.unwrap();

        let read: PayloadDescription =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(read, description);
    }
}
