//! Ticket-based signing through the signing bucket
//!
//! A request is a directory named after a fresh ticket id under the build's
//! signing URI. For every hash `i` the signer uploads:
//!
//! - `hash-<i>.bin`: the raw hash bytes
//! - `hash-<i>.bin.instructions`: which keysets to sign with
//!
//! The signing service answers with one `hash-<i>.bin.<keyset>.signed` object
//! per keyset, which are polled for until all are present.

use async_trait::async_trait;
use paygen_errors::{Error, SigningError, StorageError};
use paygen_events::{AppEvent, EventEmitter, EventSender, SigningEvent};
use paygen_net::ObjectStore;
use paygen_platform::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{HashSignatures, PayloadSigner};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Signer backed by the asynchronous signing service.
#[derive(Clone)]
pub struct RemoteSigner {
    storage: Arc<dyn ObjectStore>,
    signing_uri: String,
    work_dir: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
    public_key_uri: Option<String>,
    events: Option<EventSender>,
}

impl EventEmitter for RemoteSigner {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl RemoteSigner {
    #[must_use]
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        signing_uri: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            signing_uri: signing_uri.into().trim_end_matches('/').to_string(),
            work_dir: work_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            public_key_uri: None,
            events: None,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up on a ticket after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Where the public key of the signing keyset can be downloaded from
    #[must_use]
    pub fn with_public_key_uri(mut self, uri: Option<String>) -> Self {
        self.public_key_uri = uri;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn signing_uri(&self) -> &str {
        &self.signing_uri
    }

    /// Upload every hash with its instructions. Returns the remote URI of
    /// each hash in order.
    async fn submit(
        &self,
        ticket: &str,
        dir: &Path,
        hashes: &[Vec<u8>],
        keysets: &[String],
    ) -> Result<Vec<String>, Error> {
        let ticket_uri = format!("{}/{ticket}", self.signing_uri);
        let instructions = instructions(keysets);
        let mut hash_uris = Vec::with_capacity(hashes.len());

        for (index, hash) in hashes.iter().enumerate() {
            let name = format!("hash-{index}.bin");
            let hash_file = dir.join(&name);
            let insns_file = dir.join(format!("{name}.instructions"));
            write(&hash_file, hash).await?;
            write(&insns_file, instructions.as_bytes()).await?;

            let hash_uri = format!("{ticket_uri}/{name}");
            self.storage
                .upload(&insns_file, &format!("{hash_uri}.instructions"))
                .await?;
            self.storage.upload(&hash_file, &hash_uri).await?;
            hash_uris.push(hash_uri);
        }

        self.emit(AppEvent::Signing(SigningEvent::TicketSubmitted {
            ticket: ticket.to_string(),
            instructions: ticket_uri,
        }));
        Ok(hash_uris)
    }

    /// Poll until every `(hash, keyset)` signature is present, then download
    /// them all.
    async fn collect(
        &self,
        ticket: &str,
        dir: &Path,
        hash_uris: &[String],
        keysets: &[String],
    ) -> Result<Vec<HashSignatures>, Error> {
        let started = Instant::now();
        let mut pending: Vec<String> = hash_uris
            .iter()
            .flat_map(|uri| keysets.iter().map(move |k| signed_uri(uri, k)))
            .collect();

        loop {
            let mut still_pending = Vec::with_capacity(pending.len());
            for uri in pending {
                if !self.storage.exists(&uri).await? {
                    still_pending.push(uri);
                }
            }
            pending = still_pending;
            if pending.is_empty() {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(SigningError::Timeout {
                    ticket: ticket.to_string(),
                    seconds: self.timeout.as_secs(),
                }
                .into());
            }
            self.emit(AppEvent::Signing(SigningEvent::Polling {
                ticket: ticket.to_string(),
                pending: pending.len(),
                elapsed_secs: elapsed.as_secs(),
            }));
            tokio::time::sleep(self.poll_interval).await;
        }

        let mut results = Vec::with_capacity(hash_uris.len());
        for (index, hash_uri) in hash_uris.iter().enumerate() {
            let mut signatures = Vec::with_capacity(keysets.len());
            for keyset in keysets {
                let local = dir.join(format!("hash-{index}.bin.{keyset}.signed"));
                self.storage.fetch(&signed_uri(hash_uri, keyset), &local).await?;
                signatures.push(read(&local).await?);
            }
            results.push(signatures);
        }
        Ok(results)
    }
}

impl std::fmt::Debug for RemoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("signing_uri", &self.signing_uri)
            .field("work_dir", &self.work_dir)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("public_key_uri", &self.public_key_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PayloadSigner for RemoteSigner {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn sign_hashes(
        &self,
        hashes: &[Vec<u8>],
        keysets: &[String],
    ) -> Result<Vec<HashSignatures>, Error> {
        let ticket = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.work_dir.join("signer").join(&ticket);
        fs::create_dir_all(&dir).await?;

        self.emit(AppEvent::Signing(SigningEvent::Requested {
            signer: self.name().to_string(),
            hashes: hashes.len(),
            keysets: keysets.to_vec(),
        }));
        tracing::info!(ticket = %ticket, hashes = hashes.len(), "submitting signing request");

        let hash_uris = self.submit(&ticket, &dir, hashes, keysets).await?;
        let results = self.collect(&ticket, &dir, &hash_uris, keysets).await?;

        self.emit(AppEvent::Signing(SigningEvent::Received {
            signer: self.name().to_string(),
            hashes: results.len(),
            signatures: results.iter().map(Vec::len).sum(),
        }));
        Ok(results)
    }

    async fn extract_public_key(&self, out: &Path) -> Result<(), Error> {
        let Some(uri) = &self.public_key_uri else {
            return Err(SigningError::PublicKeyUnavailable {
                reason: "no public key URI configured for remote signing".to_string(),
            }
            .into());
        };
        self.storage.fetch(uri, out).await?;
        Ok(())
    }
}

fn signed_uri(hash_uri: &str, keyset: &str) -> String {
    format!("{hash_uri}.{keyset}.signed")
}

fn instructions(keysets: &[String]) -> String {
    format!("[insns]\nkeyset = {}\n", keysets.join(","))
}

async fn write(path: &Path, data: &[u8]) -> Result<(), Error> {
    tokio::fs::write(path, data)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, path).into())
}

async fn read(path: &Path) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, path).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `ObjectStore` over a plain directory, with `gs://bucket/` mapped onto
    /// its root.
    struct DirStore {
        root: PathBuf,
    }

    impl DirStore {
        fn path(&self, uri: &str) -> PathBuf {
            self.root.join(uri.trim_start_matches("gs://bucket/"))
        }
    }

    #[async_trait]
    impl ObjectStore for DirStore {
        async fn fetch(&self, uri: &str, dest: &Path) -> Result<u64, Error> {
            fs::copy_file(&self.path(uri), dest).await
        }

        async fn upload(&self, src: &Path, dest_uri: &str) -> Result<(), Error> {
            fs::copy_file(src, &self.path(dest_uri)).await.map(|_| ())
        }

        async fn exists(&self, uri: &str) -> Result<bool, Error> {
            Ok(fs::exists(&self.path(uri)).await)
        }
    }

    /// Answer every submitted hash with one signature per listed keyset.
    async fn fake_service(root: PathBuf) {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let Ok(mut tickets) = tokio::fs::read_dir(&root).await else {
                continue;
            };
            while let Ok(Some(ticket)) = tickets.next_entry().await {
                let mut files = tokio::fs::read_dir(ticket.path()).await.unwrap();
                while let Ok(Some(file)) = files.next_entry().await {
                    let name = file.file_name().to_string_lossy().into_owned();
                    let Some(hash_name) = name.strip_suffix(".instructions") else {
                        continue;
                    };
                    let hash_path = ticket.path().join(hash_name);
                    let hash = match tokio::fs::read(&hash_path).await {
                        Ok(hash) if !hash.is_empty() => hash,
                        _ => continue,
                    };
                    let insns = tokio::fs::read_to_string(file.path()).await.unwrap();
                    let keysets = insns.lines().find_map(|l| l.strip_prefix("keyset = ")).unwrap();
                    for keyset in keysets.split(',') {
                        let signed = ticket.path().join(format!("{hash_name}.{keyset}.signed"));
                        let tmp = signed.with_extension("tmp");
                        tokio::fs::write(&tmp, vec![hash[0]; 256]).await.unwrap();
                        tokio::fs::rename(&tmp, &signed).await.unwrap();
                    }
                }
            }
        }
    }

    fn signer(dir: &Path) -> RemoteSigner {
        let store = Arc::new(DirStore {
            root: dir.join("bucket"),
        });
        RemoteSigner::new(store, "gs://bucket/signing/", dir.join("work"))
            .with_poll_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn signs_under_every_keyset() {
        let dir = tempfile::tempdir().unwrap();
        let service = tokio::spawn(fake_service(dir.path().join("bucket/signing")));
        let signer = signer(dir.path());

        let keysets = vec!["update_signer".to_string(), "backup".to_string()];
        let results = signer
            .sign_hashes(&[vec![7u8; 32], vec![9u8; 32]], &keysets)
            .await
            .unwrap();
        service.abort();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], vec![vec![7u8; 256], vec![7u8; 256]]);
        assert_eq!(results[1], vec![vec![9u8; 256], vec![9u8; 256]]);
    }

    #[tokio::test]
    async fn unanswered_ticket_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let signer = signer(dir.path()).with_timeout(Duration::from_millis(30));

        let err = signer
            .sign_hashes(&[vec![1u8; 32]], &["update_signer".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Signing(SigningError::Timeout { .. })));
    }

    #[tokio::test]
    async fn instructions_are_uploaded_next_to_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let signer = signer(dir.path()).with_timeout(Duration::ZERO);

        let _ = signer
            .sign_hashes(&[vec![1u8; 32]], &["update_signer".to_string()])
            .await;

        let signing = dir.path().join("bucket/signing");
        let ticket = std::fs::read_dir(&signing).unwrap().next().unwrap().unwrap();
        let insns =
            std::fs::read_to_string(ticket.path().join("hash-0.bin.instructions")).unwrap();
        assert_eq!(insns, "[insns]\nkeyset = update_signer\n");
        assert_eq!(std::fs::read(ticket.path().join("hash-0.bin")).unwrap(), [1u8; 32]);
    }

    #[tokio::test]
    async fn public_key_requires_a_uri() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("key.pub.pem");

        let err = signer(dir.path()).extract_public_key(&out).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Signing(SigningError::PublicKeyUnavailable { .. })
        ));

        std::fs::create_dir_all(dir.path().join("bucket/keys")).unwrap();
        std::fs::write(dir.path().join("bucket/keys/update.pub.pem"), b"PUBLIC").unwrap();
        signer(dir.path())
            .with_public_key_uri(Some("gs://bucket/keys/update.pub.pem".into()))
            .extract_public_key(&out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"PUBLIC");
    }
}
