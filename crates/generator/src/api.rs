//! Entry points used by callers outside this crate

use paygen_errors::{Error, StorageError};
use paygen_events::{AppEvent, EventEmitter, PayloadEvent};
use paygen_platform::fs;
use paygen_types::{Image, Payload};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::context::GeneratorContext;
use crate::payload::PaygenPayload;
use crate::report::{BatchReport, RunReport};

/// Generate, sign and publish `payload` in a fresh temporary working
/// directory, removed afterwards whatever the outcome.
///
/// # Errors
///
/// Returns the error of the failing stage.
pub async fn create_and_upload_payload(
    ctx: &Arc<GeneratorContext>,
    payload: Payload,
    sign: bool,
    verify: bool,
) -> Result<RunReport, Error> {
    let root = ctx.config.work_root();
    fs::create_dir_all(&root).await?;
    let work_dir = tempfile::Builder::new()
        .prefix("paygen-")
        .tempdir_in(&root)
        .map_err(|e| StorageError::from_io_with_path(&e, &root))?;

    let result = PaygenPayload::new(ctx.clone(), payload, work_dir.path(), sign, verify, None)
        .run()
        .await;

    if let Err(e) = work_dir.close() {
        tracing::warn!(error = %e, "failed to remove working directory");
    }
    result
}

/// A single payload generation requested by explicit image locations.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Target image URI
    pub image: String,
    /// Source image URI, for a delta
    pub src_image: Option<String>,
    /// Where the payload is published
    pub output: String,
    /// Sign locally with this key. No key, no signing.
    pub private_key: Option<PathBuf>,
    pub check: bool,
    /// Reuse this working directory instead of a temporary one
    pub work_dir: Option<PathBuf>,
    /// Copy the metadata hash here when done
    pub out_metadata_hash_file: Option<PathBuf>,
}

/// Generate one payload from explicit image URIs.
///
/// # Errors
///
/// Returns an error if any stage fails or the metadata hash cannot be
/// copied out.
pub async fn generate_update_payload(
    ctx: &Arc<GeneratorContext>,
    request: GenerateRequest,
) -> Result<RunReport, Error> {
    let tgt_image = Image::from_uri(&request.image);
    let src_image = request.src_image.as_deref().map(Image::from_uri);
    let payload = match src_image {
        Some(src_image) => Payload::delta(src_image, tgt_image)?,
        None => Payload::full(tgt_image),
    }
    .with_uri(request.output.clone());

    let temp = match &request.work_dir {
        Some(_) => None,
        None => {
            let root = ctx.config.work_root();
            fs::create_dir_all(&root).await?;
            Some(
                tempfile::Builder::new()
                    .prefix("paygen-")
                    .tempdir_in(&root)
                    .map_err(|e| StorageError::from_io_with_path(&e, &root))?,
            )
        }
    };
    let work_dir = match (&request.work_dir, &temp) {
        (Some(dir), _) => dir.clone(),
        (None, Some(temp)) => temp.path().to_path_buf(),
        (None, None) => return Err(Error::internal("no working directory")),
    };

    let sign = request.private_key.is_some();
    let run = PaygenPayload::new(
        ctx.clone(),
        payload,
        &work_dir,
        sign,
        request.check,
        request.private_key.clone(),
    );
    let metadata_hash = run.files().metadata_hash.clone();

    let result = match run.run().await {
        Ok(report) => match &request.out_metadata_hash_file {
            Some(out) => fs::copy_file(&metadata_hash, out).await.map(|_| report),
            None => Ok(report),
        },
        Err(e) => Err(e),
    };

    if let Some(temp) = temp {
        if let Err(e) = temp.close() {
            tracing::warn!(error = %e, "failed to remove working directory");
        }
    }
    result
}

/// Run every payload not already published, concurrently.
///
/// Diff tool invocations stay bounded by the context's generator limit no
/// matter how many payloads are in flight. A failing payload does not stop
/// the others.
pub async fn generate_payloads(
    ctx: &Arc<GeneratorContext>,
    payloads: Vec<Payload>,
    sign: bool,
    verify: bool,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut set = JoinSet::new();

    for payload in payloads {
        if payload.exists() {
            let uri = payload.uri().map_or_else(|| payload.to_string(), str::to_string);
            tracing::info!(uri = %uri, "payload already exists, skipping");
            ctx.emit(AppEvent::Payload(PayloadEvent::Skipped {
                payload: payload.to_string(),
                uri: uri.clone(),
            }));
            report.skipped.push(uri);
            continue;
        }
        let ctx = ctx.clone();
        let name = payload.to_string();
        set.spawn(async move {
            let result = create_and_upload_payload(&ctx, payload, sign, verify).await;
            (name, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(run))) => report.succeeded.push(run),
            Ok((name, Err(e))) => report.failed.push((name, e)),
            Err(e) => report
                .failed
                .push(("<task>".to_string(), Error::internal(format!("task failed: {e}")))),
        }
    }

    tracing::info!(
        succeeded = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "payload batch finished"
    );
    report
}
