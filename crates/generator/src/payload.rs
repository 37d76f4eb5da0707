//! One payload generation run

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use paygen_errors::{ConfigError, Error, PayloadError, SigningError, StorageError};
use paygen_events::{AppEvent, EventEmitter, PayloadEvent, PayloadStage, SigningEvent};
use paygen_hash::PayloadDigests;
use paygen_net::copy;
use paygen_partition::{extract_kernel, extract_root};
use paygen_paths::{payload_uri_for, resolve_image_uri, signing_uri};
use paygen_platform::{fs, PlatformContext};
use paygen_signing::{validate_signer_results, LocalSigner, PayloadSigner, RemoteSigner};
use paygen_types::{Image, ImageKind, Payload};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::GeneratorContext;
use crate::description::PayloadDescription;
use crate::layout::{PartitionPlan, WorkFiles, KERNEL, METADATA_SIGNATURE_SUFFIX, ROOT};
use crate::report::RunReport;
use crate::stages::{
    Described, FinalPayload, HashesComputed, ImagesFetched, PartitionsExtracted, Prepared,
    UnsignedPayload, Uploaded, Verified,
};
use crate::tools::{
    check_command, generate_command, hash_command, insert_command, unpack_command, CheckRequest,
    ToolRunner,
};

const POSTINSTALL_CONFIG: &str = "RUN_POSTINSTALL_root=true\n";

/// Generates, signs, verifies and uploads a single payload.
///
/// The working directory must not be shared with any other run. It is left
/// in place afterwards, failed or not, for the caller to inspect or remove.
pub struct PaygenPayload {
    ctx: Arc<GeneratorContext>,
    payload: Payload,
    files: WorkFiles,
    plan: PartitionPlan,
    signer: Option<Arc<dyn PayloadSigner>>,
    /// Set only when signing with a local key; enables `--key` verification.
    private_key: Option<PathBuf>,
    verify: bool,
    tools: ToolRunner,
    platform: PlatformContext,
    label: String,
}

impl PaygenPayload {
    /// Set up a run for `payload` in `work_dir`.
    ///
    /// With `sign`, payloads published under the official bucket go to the
    /// signing service and are never verified against `private_key`;
    /// everything else is signed locally with `private_key` or the
    /// configured testing key.
    #[must_use]
    pub fn new(
        ctx: Arc<GeneratorContext>,
        payload: Payload,
        work_dir: &Path,
        sign: bool,
        verify: bool,
        private_key: Option<PathBuf>,
    ) -> Self {
        let files = WorkFiles::new(work_dir);
        let plan = PartitionPlan::for_payload(&payload, &files);
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let platform = ctx.platform(&run_id);
        let tools = ToolRunner::new(
            ctx.process.clone(),
            platform.clone(),
            files.log.clone(),
            ctx.config.command_timeout(),
        );

        let mut run = Self {
            label: payload.to_string(),
            ctx,
            payload,
            files,
            plan,
            signer: None,
            private_key,
            verify,
            tools,
            platform,
        };
        if sign {
            run.setup_signer();
        }
        run
    }

    /// Replace the signer chosen by policy.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn PayloadSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Files this run reads and writes
    #[must_use]
    pub fn files(&self) -> &WorkFiles {
        &self.files
    }

    fn setup_signer(&mut self) {
        let config = &self.ctx.config;
        let official = self
            .payload
            .owning_build()
            .filter(|build| build.bucket == config.signing.official_bucket);

        let signer: Arc<dyn PayloadSigner> = if let Some(build) = official {
            // Never verify an officially signed payload with a caller key.
            self.private_key = None;
            Arc::new(
                RemoteSigner::new(
                    self.ctx.storage.clone(),
                    signing_uri(build),
                    &self.files.work_dir,
                )
                .with_poll_interval(Duration::from_secs(config.signing.poll_interval_secs))
                .with_timeout(Duration::from_secs(config.signing.timeout_secs))
                .with_public_key_uri(config.signing.public_key_uri.clone())
                .with_events(self.ctx.tx.clone()),
            )
        } else {
            let key = self
                .private_key
                .get_or_insert_with(|| config.testing_private_key())
                .clone();
            Arc::new(
                LocalSigner::new(
                    key,
                    &self.files.work_dir,
                    self.ctx.process.clone(),
                    self.platform.clone(),
                )
                .with_openssl(config.tools.openssl.clone())
                .with_timeout(config.command_timeout()),
            )
        };
        tracing::debug!(payload = %self.label, signer = signer.name(), "signer selected");
        self.signer = Some(signer);
    }

    /// Run every stage in order and publish the result.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails; later stages are not
    /// attempted.
    pub async fn run(self) -> Result<RunReport, Error> {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            payload = %self.label,
            delta = self.payload.is_delta(),
            "starting payload generation"
        );

        fs::create_dir_all(&self.files.work_dir).await?;
        self.platform.emit(AppEvent::Payload(PayloadEvent::RunStarted {
            payload: self.label.clone(),
            delta: self.payload.is_delta(),
            work_dir: self.files.work_dir.display().to_string(),
        }));

        let prepared = Prepared { _private: () };
        let fetched = self
            .stage(PayloadStage::FetchImages, self.fetch_images(prepared))
            .await?;
        let extracted = self
            .stage(PayloadStage::ExtractPartitions, self.extract_partitions(fetched))
            .await?;
        let unsigned = self
            .stage(PayloadStage::GenerateUnsigned, self.generate_unsigned(extracted))
            .await?;
        let hashes = self
            .stage(PayloadStage::GenerateHashes, self.generate_hashes(unsigned))
            .await?;
        let final_payload = self.sign(hashes).await?;
        let described = self
            .stage(PayloadStage::DescribePayload, self.describe(final_payload))
            .await?;
        let verified = if self.verify {
            self.stage(PayloadStage::Verify, self.verify_payload(described))
                .await?
        } else {
            Verified {
                described,
                checked: false,
            }
        };
        let uploaded = self
            .stage(PayloadStage::Upload, self.upload(verified))
            .await?;

        let elapsed = clock.elapsed();
        tracing::info!(
            payload = %self.label,
            elapsed_ms = elapsed.as_millis(),
            "finished payload generation"
        );

        let Uploaded { verified, uri } = uploaded;
        let Verified { described, checked } = verified;
        Ok(RunReport {
            payload: self.label,
            uri,
            delta: self.payload.is_delta(),
            signed: described.payload.is_signed(),
            verified: checked,
            size: described.size,
            metadata_size: described.payload.metadata_size,
            description: described.description,
            started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn stage<T>(
        &self,
        stage: PayloadStage,
        work: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        self.platform.emit_stage_started(&self.label, stage);
        let start = Instant::now();
        match work.await {
            Ok(value) => {
                self.platform
                    .emit_stage_completed(&self.label, stage, start.elapsed());
                Ok(value)
            }
            Err(e) => {
                tracing::error!(payload = %self.label, %stage, error = %e, "stage failed");
                self.platform.emit_payload_failed(&self.label, stage, &e);
                Err(e)
            }
        }
    }

    async fn fetch_images(&self, _prepared: Prepared) -> Result<ImagesFetched, Error> {
        self.prepare_image(self.payload.tgt_image(), &self.files.tgt_image)
            .await?;
        let src_image = match self.payload.src_image() {
            Some(src) => {
                self.prepare_image(src, &self.files.src_image).await?;
                Some(self.files.src_image.clone())
            }
            None => None,
        };
        Ok(ImagesFetched {
            tgt_image: self.files.tgt_image.clone(),
            src_image,
        })
    }

    /// Fetch `image` to `dest`, unpacking it first if it is an archive.
    async fn prepare_image(&self, image: &Image, dest: &Path) -> Result<(), Error> {
        let uri = resolve_image_uri(image)?;
        tracing::info!(uri = %uri, dest = %dest.display(), "preparing image");

        let member = match &image.kind {
            ImageKind::Archive { .. } => image.image_type.archive_member(),
            ImageKind::Standard | ImageKind::Module { .. } => None,
        };
        let Some(member) = member else {
            return self.ctx.cache.get_file_copy(&uri, dest).await;
        };

        let archive = self.files.work_dir.join(format!(
            "image-archive-{}.tar.xz",
            uuid::Uuid::new_v4().simple()
        ));
        self.ctx.cache.get_file_copy(&uri, &archive).await?;
        self.tools
            .run(unpack_command(
                &self.ctx.config.tools,
                &self.files.work_dir,
                &archive,
                member,
            ))
            .await?;
        fs::atomic_rename(&self.files.work_dir.join(member), dest).await?;
        fs::remove_file(&archive).await
    }

    async fn extract_partitions(
        &self,
        fetched: ImagesFetched,
    ) -> Result<PartitionsExtracted, Error> {
        if self.plan.extract {
            for (i, name) in self.plan.names.iter().enumerate() {
                let src = fetched.src_image.as_deref().zip(self.plan.src.get(i));
                match name.as_str() {
                    ROOT => {
                        extract_root(&fetched.tgt_image, &self.plan.tgt[i], true).await?;
                        if let Some((image, out)) = src {
                            extract_root(image, out, true).await?;
                        }
                    }
                    KERNEL => {
                        extract_kernel(&fetched.tgt_image, &self.plan.tgt[i]).await?;
                        if let Some((image, out)) = src {
                            extract_kernel(image, out).await?;
                        }
                    }
                    other => {
                        return Err(ConfigError::InvalidValue {
                            field: "partition".to_string(),
                            value: other.to_string(),
                        }
                        .into())
                    }
                }
            }
        }

        let postinstall_config = if self.payload.is_module() {
            None
        } else {
            let path = &self.files.postinstall_config;
            tokio::fs::write(path, POSTINSTALL_CONFIG)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, path))?;
            Some(path.clone())
        };
        Ok(PartitionsExtracted { postinstall_config })
    }

    async fn generate_unsigned(
        &self,
        extracted: PartitionsExtracted,
    ) -> Result<UnsignedPayload, Error> {
        tracing::info!(out = %self.files.payload.display(), "generating unsigned payload");
        let cmd = generate_command(
            &self.ctx.config.tools,
            &self.files,
            &self.plan,
            self.payload.tgt_image(),
            self.payload.src_image(),
            extracted.postinstall_config.as_deref(),
        );

        let available = self.ctx.resources.available_generator_permits();
        if available == 0 {
            self.platform
                .emit(AppEvent::Payload(PayloadEvent::WaitingForSlot {
                    payload: self.label.clone(),
                    available,
                }));
        }
        // The diff tool is internally parallel; the permit bounds how many
        // run at once and is released when dropped, on every path.
        let _permit = self.ctx.resources.acquire_generator_permit().await?;
        self.tools.run(cmd).await?;

        Ok(UnsignedPayload {
            path: self.files.payload.clone(),
        })
    }

    async fn generate_hashes(&self, unsigned: UnsignedPayload) -> Result<HashesComputed, Error> {
        let cmd = hash_command(
            &self.ctx.config.tools,
            &self.files,
            &self.ctx.config.signing.signature_sizes,
        );
        self.tools.run(cmd).await?;
        Ok(HashesComputed {
            unsigned: unsigned.path,
            payload_hash: read(&self.files.payload_hash).await?,
            metadata_hash: read(&self.files.metadata_hash).await?,
        })
    }

    async fn sign(&self, hashes: HashesComputed) -> Result<FinalPayload, Error> {
        let Some(signer) = &self.signer else {
            return Ok(FinalPayload::unsigned(hashes.unsigned));
        };

        let (payload_signatures, metadata_signatures) = self
            .stage(PayloadStage::SignHashes, self.sign_hashes(signer.as_ref(), &hashes))
            .await?;
        let metadata_size = self
            .stage(
                PayloadStage::InsertSignatures,
                self.insert_signatures(&payload_signatures, &metadata_signatures),
            )
            .await?;
        let encoded = self
            .stage(
                PayloadStage::StoreMetadataSignature,
                self.store_metadata_signature(&metadata_signatures),
            )
            .await?;

        Ok(FinalPayload {
            path: self.files.signed_payload.clone(),
            metadata_size,
            metadata_signature: Some((encoded, self.files.metadata_signature.clone())),
        })
    }

    /// Sign both hashes and check the result before anything uses it.
    async fn sign_hashes(
        &self,
        signer: &dyn PayloadSigner,
        hashes: &HashesComputed,
    ) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>), Error> {
        let signing = &self.ctx.config.signing;
        tracing::info!(keysets = ?signing.keysets, signer = signer.name(), "signing payload hashes");

        let to_sign = [hashes.payload_hash.clone(), hashes.metadata_hash.clone()];
        let results = signer.sign_hashes(&to_sign, &signing.keysets).await?;

        let checked = validate_signer_results(&results, to_sign.len(), &signing.signature_sizes)
            .and_then(|()| match results.as_slice() {
                [_, metadata] if metadata.len() != 1 => Err(SigningError::UnexpectedSignerResults {
                    message: format!(
                        "received {} metadata signatures, only one is supported",
                        metadata.len()
                    ),
                }
                .into()),
                _ => Ok(()),
            });
        if let Err(e) = checked {
            self.platform.emit(AppEvent::Signing(SigningEvent::Rejected {
                signer: signer.name().to_string(),
                reason: e.to_string(),
            }));
            return Err(e);
        }

        let mut results = results.into_iter();
        let payload_signatures = results.next().unwrap_or_default();
        let metadata_signatures = results.next().unwrap_or_default();
        Ok((payload_signatures, metadata_signatures))
    }

    async fn insert_signatures(
        &self,
        payload_signatures: &[Vec<u8>],
        metadata_signatures: &[Vec<u8>],
    ) -> Result<u64, Error> {
        tracing::info!(out = %self.files.signed_payload.display(), "inserting signatures");
        let payload_files = self.write_signatures("payload", payload_signatures).await?;
        let metadata_files = self
            .write_signatures("metadata", metadata_signatures)
            .await?;

        let cmd = insert_command(
            &self.ctx.config.tools,
            &self.files,
            &payload_files,
            &metadata_files,
        );
        self.tools.run(cmd).await?;
        read_metadata_size(&self.files.metadata_size).await
    }

    async fn write_signatures(
        &self,
        kind: &str,
        signatures: &[Vec<u8>],
    ) -> Result<Vec<PathBuf>, Error> {
        let mut paths = Vec::with_capacity(signatures.len());
        for (index, signature) in signatures.iter().enumerate() {
            let path = self.files.signature_file(kind, index);
            tokio::fs::write(&path, signature)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, &path))?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn store_metadata_signature(&self, signatures: &[Vec<u8>]) -> Result<String, Error> {
        let [signature] = signatures else {
            return Err(SigningError::UnexpectedSignerResults {
                message: format!(
                    "received {} metadata signatures, only one is supported",
                    signatures.len()
                ),
            }
            .into());
        };
        let encoded = STANDARD.encode(signature);
        let path = &self.files.metadata_signature;
        tokio::fs::write(path, &encoded)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;
        Ok(encoded)
    }

    async fn describe(&self, payload: FinalPayload) -> Result<Described, Error> {
        let digests = PayloadDigests::from_file(&payload.path).await?;
        let description = PayloadDescription::new(
            &digests,
            payload.metadata_size,
            payload.metadata_signature.as_ref().map(|(b64, _)| b64.clone()),
        );
        description.write(&self.files.description).await?;
        Ok(Described {
            payload,
            description,
            size: digests.size,
        })
    }

    async fn verify_payload(&self, described: Described) -> Result<Verified, Error> {
        let delta = self.payload.is_delta();
        tracing::info!(delta, "applying payload and verifying result");

        let public_key = match (&self.signer, &self.private_key) {
            (Some(signer), Some(_)) => {
                signer.extract_public_key(&self.files.public_key).await?;
                Some(self.files.public_key.as_path())
            }
            _ => None,
        };

        let request = CheckRequest {
            payload: &described.payload.path,
            plan: &self.plan,
            delta,
            metadata_signature: described
                .payload
                .metadata_signature
                .as_ref()
                .map(|(_, path)| path.as_path()),
            metadata_size: described.payload.metadata_size,
            public_key,
        };
        let output = self
            .tools
            .run_unchecked(check_command(&self.ctx.config.tools, &request))
            .await?;
        if !output.success() {
            return Err(PayloadError::VerificationFailed {
                output: output.output,
            }
            .into());
        }

        Ok(Verified {
            described,
            checked: true,
        })
    }

    fn destination_uri(&self) -> Result<String, Error> {
        match self.payload.uri() {
            Some(uri) => Ok(uri.to_string()),
            None => payload_uri_for(&self.payload, None).map_err(|e| {
                tracing::debug!(error = %e, "cannot derive payload uri");
                PayloadError::MissingUri.into()
            }),
        }
    }

    async fn upload(&self, verified: Verified) -> Result<Uploaded, Error> {
        let uri = self.destination_uri()?;
        tracing::info!(uri = %uri, "uploading payload");

        let storage = self.ctx.storage.as_ref();
        let payload = &verified.described.payload;
        copy(storage, &payload.path, &uri).await?;
        if let Some((_, sidecar)) = &payload.metadata_signature {
            copy(storage, sidecar, &format!("{uri}{METADATA_SIGNATURE_SUFFIX}")).await?;
        }
        copy(storage, &self.files.log, &format!("{uri}.log")).await?;
        copy(storage, &self.files.description, &format!("{uri}.json")).await?;

        self.platform.emit(AppEvent::Payload(PayloadEvent::Uploaded {
            payload: self.label.clone(),
            uri: uri.clone(),
            size: verified.described.size,
        }));
        Ok(Uploaded { verified, uri })
    }
}

impl std::fmt::Debug for PaygenPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaygenPayload")
            .field("payload", &self.label)
            .field("work_dir", &self.files.work_dir)
            .field("signed", &self.signer.is_some())
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, path).into())
}

/// Parse the metadata size written by the signature insertion step.
async fn read_metadata_size(path: &Path) -> Result<u64, Error> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PayloadError::MetadataSizeMissing {
                path: path.display().to_string(),
            }
            .into())
        }
        Err(e) => return Err(StorageError::from_io_with_path(&e, path).into()),
    };
    let value = text.trim();
    value.parse::<u64>().map_err(|_| {
        PayloadError::InvalidMetadataSize {
            value: value.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metadata_size_is_parsed_after_trimming() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_size.txt");
        tokio::fs::write(&path, "12345\n").await.unwrap();
        assert_eq!(read_metadata_size(&path).await.unwrap(), 12345);
    }

    #[tokio::test]
    async fn missing_metadata_size_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata_size(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Payload(PayloadError::MetadataSizeMissing { .. })
        ));
    }

    #[tokio::test]
    async fn non_integer_metadata_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_size.txt");
        tokio::fs::write(&path, "twelve").await.unwrap();
        let err = read_metadata_size(&path).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Payload(PayloadError::InvalidMetadataSize { .. })
        ));
    }
}
