//! Signing with a private key on disk through `openssl`

use async_trait::async_trait;
use paygen_errors::{Error, SigningError, StorageError};
use paygen_events::{AppEvent, EventEmitter, SigningEvent};
use paygen_platform::{fs, run_checked, PlatformCommand, PlatformContext, ProcessOperations};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::{HashSignatures, PayloadSigner};

/// Signs hashes with a local RSA private key.
///
/// Every hash gets exactly one signature no matter how many keysets are
/// requested, since there is only one key.
#[derive(Clone)]
pub struct LocalSigner {
    private_key: PathBuf,
    work_dir: PathBuf,
    openssl: String,
    timeout: Option<Duration>,
    process: Arc<dyn ProcessOperations>,
    ctx: PlatformContext,
}

impl LocalSigner {
    /// Signer using `private_key`, keeping intermediate files in `work_dir`.
    #[must_use]
    pub fn new(
        private_key: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        process: Arc<dyn ProcessOperations>,
        ctx: PlatformContext,
    ) -> Self {
        Self {
            private_key: private_key.into(),
            work_dir: work_dir.into(),
            openssl: "openssl".to_string(),
            timeout: None,
            process,
            ctx,
        }
    }

    /// Override the `openssl` executable
    #[must_use]
    pub fn with_openssl(mut self, openssl: impl Into<String>) -> Self {
        self.openssl = openssl.into();
        self
    }

    /// Time limit for each `openssl` invocation
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn private_key(&self) -> &Path {
        &self.private_key
    }

    async fn ensure_key(&self) -> Result<(), Error> {
        if fs::exists(&self.private_key).await {
            Ok(())
        } else {
            Err(SigningError::KeyNotFound {
                path: self.private_key.display().to_string(),
            }
            .into())
        }
    }

    fn openssl_command(&self) -> PlatformCommand {
        let mut cmd = PlatformCommand::new(&self.openssl);
        cmd.timeout(self.timeout);
        cmd
    }

    async fn sign_one(&self, dir: &Path, index: usize, hash: &[u8]) -> Result<Vec<u8>, Error> {
        let hash_file = dir.join(format!("hash-{index}.bin"));
        let sig_file = dir.join(format!("hash-{index}.bin.sig"));
        tokio::fs::write(&hash_file, hash)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &hash_file))?;

        let mut cmd = self.openssl_command();
        cmd.args(["pkeyutl", "-sign", "-inkey"])
            .arg(self.private_key.display().to_string())
            .args(["-pkeyopt", "digest:sha256", "-in"])
            .arg(hash_file.display().to_string())
            .arg("-out")
            .arg(sig_file.display().to_string());
        run_checked(self.process.as_ref(), &self.ctx, cmd).await?;

        tokio::fs::read(&sig_file)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &sig_file).into())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("private_key", &self.private_key)
            .field("work_dir", &self.work_dir)
            .field("openssl", &self.openssl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PayloadSigner for LocalSigner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn sign_hashes(
        &self,
        hashes: &[Vec<u8>],
        keysets: &[String],
    ) -> Result<Vec<HashSignatures>, Error> {
        self.ensure_key().await?;
        if keysets.len() > 1 {
            tracing::warn!(
                keysets = keysets.len(),
                "local signer only has one key, signing once per hash"
            );
        }
        self.ctx.emit(AppEvent::Signing(SigningEvent::Requested {
            signer: self.name().to_string(),
            hashes: hashes.len(),
            keysets: keysets.to_vec(),
        }));

        let dir = self.work_dir.join("local-signer");
        fs::create_dir_all(&dir).await?;

        let mut results = Vec::with_capacity(hashes.len());
        for (index, hash) in hashes.iter().enumerate() {
            let signature = self.sign_one(&dir, index, hash).await?;
            results.push(vec![signature]);
        }

        self.ctx.emit(AppEvent::Signing(SigningEvent::Received {
            signer: self.name().to_string(),
            hashes: hashes.len(),
            signatures: results.len(),
        }));
        Ok(results)
    }

    async fn extract_public_key(&self, out: &Path) -> Result<(), Error> {
        self.ensure_key().await?;
        let mut cmd = self.openssl_command();
        cmd.args(["rsa", "-in"])
            .arg(self.private_key.display().to_string())
            .arg("-pubout")
            .arg("-out")
            .arg(out.display().to_string());
        run_checked(self.process.as_ref(), &self.ctx, cmd)
            .await
            .map_err(|e| {
                Error::from(SigningError::PublicKeyUnavailable {
                    reason: e.to_string(),
                })
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygen_platform::CommandOutput;
    use std::sync::Mutex;

    /// Stands in for openssl: writes a 256 byte "signature" derived from the
    /// input so different hashes give different signatures.
    #[derive(Default)]
    struct FakeOpenssl {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> &'a str {
        let at = args.iter().position(|a| a == flag).unwrap();
        &args[at + 1]
    }

    #[async_trait]
    impl ProcessOperations for FakeOpenssl {
        async fn execute_command(
            &self,
            _ctx: &PlatformContext,
            cmd: PlatformCommand,
        ) -> Result<CommandOutput, Error> {
            let args = cmd.get_args().to_vec();
            self.calls.lock().unwrap().push(args.clone());
            if self.fail {
                return Ok(CommandOutput {
                    exit_code: Some(1),
                    output: "unable to load key".into(),
                });
            }
            let out = flag_value(&args, "-out");
            if args[0] == "pkeyutl" {
                let input = tokio::fs::read(flag_value(&args, "-in")).await.unwrap();
                tokio::fs::write(out, vec![input[0]; 256]).await.unwrap();
            } else {
                tokio::fs::write(out, b"-----BEGIN PUBLIC KEY-----\n").await.unwrap();
            }
            Ok(CommandOutput {
                exit_code: Some(0),
                output: String::new(),
            })
        }
    }

    async fn signer(dir: &Path, process: Arc<FakeOpenssl>) -> LocalSigner {
        let key = dir.join("key.pem");
        tokio::fs::write(&key, b"private").await.unwrap();
        LocalSigner::new(key, dir.join("work"), process, PlatformContext::default())
    }

    #[tokio::test]
    async fn signs_each_hash_once() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(FakeOpenssl::default());
        let signer = signer(dir.path(), process.clone()).await;

        let hashes = vec![vec![1u8; 32], vec![2u8; 32]];
        let results = signer
            .sign_hashes(&hashes, &["update_signer".to_string()])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], vec![vec![1u8; 256]]);
        assert_eq!(results[1], vec![vec![2u8; 256]]);

        let calls = process.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(&calls[0][..2], ["pkeyutl", "-sign"]);
        assert!(calls[0].contains(&"digest:sha256".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_running_openssl() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(FakeOpenssl::default());
        let signer = LocalSigner::new(
            dir.path().join("nope.pem"),
            dir.path(),
            process.clone(),
            PlatformContext::default(),
        );

        let err = signer.sign_hashes(&[vec![0; 32]], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Signing(SigningError::KeyNotFound { .. })
        ));
        assert!(process.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extracts_public_key_with_rsa_pubout() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(FakeOpenssl::default());
        let signer = signer(dir.path(), process.clone())
            .await
            .with_openssl("/usr/bin/openssl");

        let out = dir.path().join("public_key.pem");
        signer.extract_public_key(&out).await.unwrap();
        assert!(out.exists());
        assert!(process.calls.lock().unwrap()[0].contains(&"-pubout".to_string()));
    }

    #[tokio::test]
    async fn openssl_failure_surfaces_as_public_key_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(FakeOpenssl {
            fail: true,
            ..FakeOpenssl::default()
        });
        let signer = signer(dir.path(), process).await;

        let err = signer
            .extract_public_key(&dir.path().join("pub.pem"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Signing(SigningError::PublicKeyUnavailable { .. })
        ));
    }
}
