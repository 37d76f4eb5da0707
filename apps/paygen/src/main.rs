//! paygen - generate ChromeOS update payloads
//!
//! Thin front end over the generator crate: loads configuration, builds the
//! generator context and either extracts partitions or produces one payload,
//! rendering library events through `tracing` as they arrive.

mod cli;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, ExtractArgs};
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use paygen_config::Config;
use paygen_events::EventReceiver;
use paygen_generator::{
    generate_update_payload, GenerateRequest, GeneratorContext, GeneratorContextBuilder,
    RunReport,
};
use paygen_net::{local_path, uri_type, UriType};
use paygen_platform::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    logging::init_tracing(json_mode, cli.debug);

    if let Err(e) = run(cli).await {
        error!("paygen failed: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting paygen v{}", env!("CARGO_PKG_VERSION"));

    // Defaults, then file, then environment.
    let mut config = Config::load_or_default(cli.config.as_deref()).await?;
    config.merge_env()?;

    let (event_sender, event_receiver) = paygen_events::channel();
    let ctx = GeneratorContextBuilder::new()
        .with_config(config)
        .with_event_sender(event_sender)
        .build()
        .await?;
    let ctx = Arc::new(ctx);
    let mut handler = EventHandler::new(cli.debug);

    if cli.extract.extract {
        return with_events(
            extract_partitions(&ctx, &cli.image, cli.src_image.as_deref(), &cli.extract),
            event_receiver,
            &mut handler,
        )
        .await;
    }

    let output = cli
        .output
        .clone()
        .ok_or_else(|| paygen_errors::Error::internal("--output is required"))?;
    let request = GenerateRequest {
        image: cli.image,
        src_image: cli.src_image,
        output,
        private_key: cli.private_key,
        check: cli.check,
        work_dir: cli.work_dir,
        out_metadata_hash_file: cli.out_metadata_hash_file,
    };

    let report = with_events(
        generate_update_payload(&ctx, request),
        event_receiver,
        &mut handler,
    )
    .await?;
    render_report(&report, cli.json)?;

    if handler.failed() > 0 {
        return Err(CliError::Failed(handler.failed()));
    }
    info!(uploaded = handler.uploaded(), "done");
    Ok(())
}

/// Drive `work` to completion while logging the events it emits.
async fn with_events<T, E>(
    work: impl Future<Output = Result<T, E>>,
    mut receiver: EventReceiver,
    handler: &mut EventHandler,
) -> Result<T, CliError>
where
    CliError: From<E>,
{
    let mut work = Box::pin(work);
    loop {
        select! {
            result = &mut work => {
                while let Ok(event) = receiver.try_recv() {
                    handler.handle_event(event);
                }
                return result.map_err(CliError::from);
            }
            event = receiver.recv() => {
                if let Some(event) = event {
                    handler.handle_event(event);
                }
            }
        }
    }
}

fn render_report(report: &RunReport, json: bool) -> Result<(), CliError> {
    if json {
        let text = serde_json::to_string_pretty(report)
            .map_err(|e| paygen_errors::Error::internal(format!("rendering report: {e}")))?;
        println!("{text}");
    } else {
        println!(
            "{} -> {} ({} bytes{}{})",
            report.payload,
            report.uri,
            report.size,
            if report.signed { ", signed" } else { "" },
            if report.verified { ", verified" } else { "" },
        );
    }
    Ok(())
}

/// Local path of `uri`, fetching it into `scratch` first when remote.
async fn local_image(
    ctx: &GeneratorContext,
    uri: &str,
    scratch: &Path,
    name: &str,
) -> Result<PathBuf, paygen_errors::Error> {
    if uri_type(uri) == UriType::Local {
        return Ok(local_path(uri));
    }
    let dest = scratch.join(name);
    ctx.cache.get_file_copy(uri, &dest).await?;
    Ok(dest)
}

/// Extraction-only mode: cut the requested partitions out of the images.
async fn extract_partitions(
    ctx: &GeneratorContext,
    image: &str,
    src_image: Option<&str>,
    args: &ExtractArgs,
) -> Result<(), paygen_errors::Error> {
    if !args.any() {
        tracing::warn!("--extract given without any partition paths, nothing to do");
        return Ok(());
    }

    let root = ctx.config.work_root();
    fs::create_dir_all(&root).await?;
    let scratch = tempfile::Builder::new()
        .prefix("paygen-extract-")
        .tempdir_in(&root)
        .map_err(|e| paygen_errors::StorageError::from_io_with_path(&e, &root))?;

    if args.kern_path.is_some() || args.root_path.is_some() || args.root_pretruncate_path.is_some()
    {
        let tgt = local_image(ctx, image, scratch.path(), "tgt_image.bin").await?;
        if let Some(out) = &args.kern_path {
            paygen_partition::extract_kernel(&tgt, out).await?;
            info!(out = %out.display(), "extracted target kernel");
        }
        if let Some(out) = &args.root_pretruncate_path {
            paygen_partition::extract_root(&tgt, out, false).await?;
            info!(out = %out.display(), "extracted target root partition");
        }
        if let Some(out) = &args.root_path {
            paygen_partition::extract_root(&tgt, out, true).await?;
            info!(out = %out.display(), "extracted target root filesystem");
        }
    }

    if let Some(src_image) = src_image {
        if args.src_kern_path.is_some() || args.src_root_path.is_some() {
            let src = local_image(ctx, src_image, scratch.path(), "src_image.bin").await?;
            if let Some(out) = &args.src_kern_path {
                paygen_partition::extract_kernel(&src, out).await?;
                info!(out = %out.display(), "extracted source kernel");
            }
            if let Some(out) = &args.src_root_path {
                paygen_partition::extract_root(&src, out, true).await?;
                info!(out = %out.display(), "extracted source root filesystem");
            }
        }
    }

    if let Err(e) = scratch.close() {
        tracing::warn!(error = %e, "failed to remove scratch directory");
    }
    Ok(())
}
