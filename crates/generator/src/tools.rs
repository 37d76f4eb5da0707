//! External tool invocations and their argument policies
//!
//! Every invocation goes through [`ToolRunner`], which appends the command
//! line and its combined output to the run log whether it succeeds or not.

use paygen_config::ToolsConfig;
use paygen_errors::{Error, PlatformError, StorageError};
use paygen_platform::{CommandOutput, PlatformCommand, PlatformContext, ProcessOperations};
use paygen_types::Image;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::layout::{PartitionPlan, WorkFiles};

/// Runs tools for one payload and keeps its log.
#[derive(Clone)]
pub(crate) struct ToolRunner {
    process: Arc<dyn ProcessOperations>,
    ctx: PlatformContext,
    log: PathBuf,
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub(crate) fn new(
        process: Arc<dyn ProcessOperations>,
        ctx: PlatformContext,
        log: PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            process,
            ctx,
            log,
            timeout,
        }
    }

    /// Run `cmd` and record it, without judging the exit status.
    pub(crate) async fn run_unchecked(
        &self,
        mut cmd: PlatformCommand,
    ) -> Result<CommandOutput, Error> {
        cmd.timeout(self.timeout);
        let command = cmd.command_line();
        let output = self.process.execute_command(&self.ctx, cmd).await?;
        self.append_log(&command, &output.output).await?;
        if !output.success() {
            tracing::error!(
                command = %command,
                exit_code = ?output.exit_code,
                "nonzero exit, command output:\n{}",
                output.output
            );
        }
        Ok(output)
    }

    /// Run `cmd`, failing with `PlatformError::CommandFailed` on a nonzero
    /// exit.
    pub(crate) async fn run(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error> {
        let command = cmd.command_line();
        let output = self.run_unchecked(cmd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(PlatformError::CommandFailed {
                command,
                exit_code: output.exit_code,
                output: output.output,
            }
            .into())
        }
    }

    async fn append_log(&self, command: &str, output: &str) -> Result<(), Error> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &self.log))?;
        let entry = format!("Output of command: {command}\n{output}");
        file.write_all(entry.as_bytes()).await?;
        if !output.is_empty() && !output.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn joined(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| display(p)).collect::<Vec<_>>().join(":")
}

/// `tar` command unpacking `member` from `archive` into the working directory.
pub(crate) fn unpack_command(
    tools: &ToolsConfig,
    work_dir: &Path,
    archive: &Path,
    member: &str,
) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(&tools.tar);
    cmd.arg("-xJf")
        .arg(display(archive))
        .arg(member)
        .current_dir(work_dir);
    cmd
}

/// Build identification arguments for one side of the payload.
///
/// Either all six are passed or none: when the image has a build, missing
/// image-level values fall back to the build's, and the key falls back to
/// `test` when the build has a channel.
fn build_args(side: &str, image: &Image) -> Vec<String> {
    let Some(build) = &image.build else {
        return Vec::new();
    };
    let default_key = if build.channel.is_empty() { "" } else { "test" };
    vec![
        format!("--{side}_channel={}", build.channel),
        format!("--{side}_board={}", build.board),
        format!("--{side}_version={}", build.version),
        format!(
            "--{side}_build_channel={}",
            image.image_channel.as_deref().unwrap_or(&build.channel)
        ),
        format!(
            "--{side}_build_version={}",
            image.image_version.as_deref().unwrap_or(&build.version)
        ),
        format!(
            "--{side}_key={}",
            image.key.as_deref().filter(|k| !k.is_empty()).unwrap_or(default_key)
        ),
    ]
}

/// Diff tool invocation producing the unsigned payload.
pub(crate) fn generate_command(
    tools: &ToolsConfig,
    files: &WorkFiles,
    plan: &PartitionPlan,
    tgt: &Image,
    src: Option<&Image>,
    postinstall: Option<&Path>,
) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(&tools.delta_generator);
    cmd.arg("--major_version=2")
        .arg(format!("--out_file={}", display(&files.payload)))
        .arg(format!("--partition_names={}", plan.names.join(":")))
        .arg(format!("--new_partitions={}", joined(&plan.tgt)));
    if let Some(config) = postinstall {
        cmd.arg(format!("--new_postinstall_config_file={}", display(config)));
    }
    cmd.args(build_args("new", tgt));

    if let Some(src) = src {
        cmd.arg(format!("--old_partitions={}", joined(&plan.src)));
        cmd.args(build_args("old", src));
    }
    cmd
}

/// Diff tool invocation extracting the payload and metadata hashes.
pub(crate) fn hash_command(
    tools: &ToolsConfig,
    files: &WorkFiles,
    signature_sizes: &[usize],
) -> PlatformCommand {
    let sizes = signature_sizes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(":");
    let mut cmd = PlatformCommand::new(&tools.delta_generator);
    cmd.arg(format!("--in_file={}", display(&files.payload)))
        .arg(format!("--signature_size={sizes}"))
        .arg(format!("--out_hash_file={}", display(&files.payload_hash)))
        .arg(format!(
            "--out_metadata_hash_file={}",
            display(&files.metadata_hash)
        ));
    cmd
}

/// Diff tool invocation inserting signatures into the payload.
pub(crate) fn insert_command(
    tools: &ToolsConfig,
    files: &WorkFiles,
    payload_signatures: &[PathBuf],
    metadata_signatures: &[PathBuf],
) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(&tools.delta_generator);
    cmd.arg(format!("--in_file={}", display(&files.payload)))
        .arg(format!(
            "--payload_signature_file={}",
            joined(payload_signatures)
        ))
        .arg(format!(
            "--metadata_signature_file={}",
            joined(metadata_signatures)
        ))
        .arg(format!("--out_file={}", display(&files.signed_payload)))
        .arg(format!(
            "--out_metadata_size_file={}",
            display(&files.metadata_size)
        ));
    cmd
}

/// What the payload checker needs to know about the payload under test.
pub(crate) struct CheckRequest<'a> {
    pub payload: &'a Path,
    pub plan: &'a PartitionPlan,
    pub delta: bool,
    pub metadata_signature: Option<&'a Path>,
    pub metadata_size: u64,
    pub public_key: Option<&'a Path>,
}

/// Payload checker invocation applying the payload and checking the result.
pub(crate) fn check_command(tools: &ToolsConfig, request: &CheckRequest<'_>) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(&tools.payload_checker);
    cmd.arg(display(request.payload))
        .arg("--check")
        .arg("--type")
        .arg(if request.delta { "delta" } else { "full" })
        .args(["--disabled_tests", "move-same-src-dst-block"])
        .arg("--part_names")
        .args(&request.plan.names)
        .arg("--dst_part_paths")
        .args(request.plan.tgt.iter().map(|p| display(p)));
    if let Some(signature) = request.metadata_signature {
        cmd.arg("--meta-sig").arg(display(signature));
    }
    cmd.arg("--metadata-size")
        .arg(request.metadata_size.to_string());
    if request.delta {
        cmd.arg("--src_part_paths")
            .args(request.plan.src.iter().map(|p| display(p)));
    }
    if let Some(key) = request.public_key {
        cmd.arg("--key").arg(display(key));
    }
    cmd
}
