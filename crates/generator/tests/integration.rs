//! End-to-end runs against scripted tools

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use paygen_config::Config;
use paygen_errors::{Error, PlatformError, SigningError};
use paygen_generator::{
    create_and_upload_payload, generate_payloads, generate_update_payload, GenerateRequest,
    GeneratorContext, GeneratorContextBuilder, PaygenPayload,
};
use paygen_platform::{CommandOutput, PlatformCommand, PlatformContext, ProcessOperations};
use paygen_signing::{HashSignatures, PayloadSigner};
use paygen_types::{Build, Image, ImageType, Payload};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Stands in for the diff tool, the payload checker and `tar`.
#[derive(Default)]
struct FakeTools {
    calls: Mutex<Vec<Vec<String>>>,
    fail_generate: bool,
    generate_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTools {
    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn called_with(&self, prefix: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| call.iter().any(|arg| arg.starts_with(prefix)))
    }
}

fn flag(args: &[String], name: &str) -> Option<PathBuf> {
    args.iter()
        .find_map(|arg| arg.strip_prefix(name))
        .map(PathBuf::from)
}

fn ok(output: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        output: output.to_string(),
    }
}

#[async_trait]
impl ProcessOperations for FakeTools {
    async fn execute_command(
        &self,
        _ctx: &PlatformContext,
        cmd: PlatformCommand,
    ) -> Result<CommandOutput, Error> {
        let args = cmd.get_args().to_vec();
        let mut call = vec![cmd.program().to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        match cmd.program() {
            "delta_generator" if args.iter().any(|a| a.starts_with("--partition_names=")) => {
                if self.fail_generate {
                    return Ok(CommandOutput {
                        exit_code: Some(1),
                        output: "delta_generator: boom\n".to_string(),
                    });
                }
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.generate_delay).await;
                let out = flag(&args, "--out_file=").unwrap();
                tokio::fs::write(out, b"unsigned payload").await.unwrap();
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(ok("generated\n"))
            }
            "delta_generator" if args.iter().any(|a| a.starts_with("--out_hash_file=")) => {
                let payload_hash = flag(&args, "--out_hash_file=").unwrap();
                let metadata_hash = flag(&args, "--out_metadata_hash_file=").unwrap();
                tokio::fs::write(payload_hash, [0x11; 32]).await.unwrap();
                tokio::fs::write(metadata_hash, [0x22; 32]).await.unwrap();
                Ok(ok(""))
            }
            "delta_generator" if args.iter().any(|a| a.starts_with("--payload_signature_file=")) => {
                let out = flag(&args, "--out_file=").unwrap();
                let size = flag(&args, "--out_metadata_size_file=").unwrap();
                tokio::fs::write(out, b"signed payload").await.unwrap();
                tokio::fs::write(size, "4321\n").await.unwrap();
                Ok(ok(""))
            }
            "check_update_payload" => Ok(ok("payload verified\n")),
            "tar" => {
                let dir = cmd.get_current_dir().unwrap().to_path_buf();
                let member = args.last().unwrap();
                tokio::fs::write(dir.join(member), disk_image()).await.unwrap();
                Ok(ok(""))
            }
            other => Ok(CommandOutput {
                exit_code: Some(127),
                output: format!("{other}: not found"),
            }),
        }
    }
}

/// Signer returning fixed signatures, or a malformed result set.
struct FakeSigner {
    results: Vec<HashSignatures>,
}

impl FakeSigner {
    fn good() -> Self {
        Self {
            results: vec![vec![vec![1; 256]], vec![vec![2; 256]]],
        }
    }

    fn short_signatures() -> Self {
        Self {
            results: vec![vec![vec![1; 10]], vec![vec![2; 10]]],
        }
    }
}

#[async_trait]
impl PayloadSigner for FakeSigner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn sign_hashes(
        &self,
        hashes: &[Vec<u8>],
        _keysets: &[String],
    ) -> Result<Vec<HashSignatures>, Error> {
        assert_eq!(hashes, [vec![0x11; 32], vec![0x22; 32]]);
        Ok(self.results.clone())
    }

    async fn extract_public_key(&self, out: &Path) -> Result<(), Error> {
        tokio::fs::write(out, "-----BEGIN PUBLIC KEY-----\n")
            .await
            .map_err(Error::from)
    }
}

struct Harness {
    dir: TempDir,
    tools: Arc<FakeTools>,
    ctx: Arc<GeneratorContext>,
}

impl Harness {
    async fn new(tools: FakeTools) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.cache_dir = Some(dir.path().join("cache"));
        config.paths.work_root = Some(dir.path().join("work"));
        config.limits.concurrent_generators = 2;

        let tools = Arc::new(tools);
        let ctx = GeneratorContextBuilder::new()
            .with_config(config)
            .with_process(tools.clone())
            .build()
            .await
            .unwrap();
        Self {
            dir,
            tools,
            ctx: Arc::new(ctx),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Full module payload whose image is a local file.
    async fn module_payload(&self, name: &str) -> (Payload, PathBuf) {
        let build = Build::release("test-bucket", "dev-channel", "eve", "12000.0.0").unwrap();
        let image = self.path(&format!("{name}.img"));
        tokio::fs::write(&image, b"module image").await.unwrap();
        let out = self.path(&format!("out/{name}.bin"));
        let payload = Payload::full(
            Image::module(build, "sample-dlc", "package", "dlc.img")
                .with_uri(image.display().to_string()),
        )
        .with_uri(out.display().to_string());
        (payload, out)
    }
}

/// Disk image with a kernel partition and an ext root holding an 8 KiB
/// filesystem in a 16 KiB partition.
fn disk_image() -> Vec<u8> {
    const KERN_LBA: u64 = 64;
    const ROOT_LBA: u64 = 72;
    const ROOT_SECTORS: u64 = 32;

    fn entry(image: &mut [u8], slot: usize, name: &str, first: u64, last: u64) {
        let base = 1024 + slot * 128;
        image[base] = 0xAA;
        image[base + 32..base + 40].copy_from_slice(&first.to_le_bytes());
        image[base + 40..base + 48].copy_from_slice(&last.to_le_bytes());
        for (i, unit) in name.encode_utf16().enumerate() {
            image[base + 56 + i * 2..base + 58 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    let mut image = vec![0u8; ((ROOT_LBA + ROOT_SECTORS) * 512) as usize];
    image[512..520].copy_from_slice(b"EFI PART");
    image[584..592].copy_from_slice(&2u64.to_le_bytes());
    image[592..596].copy_from_slice(&128u32.to_le_bytes());
    image[596..600].copy_from_slice(&128u32.to_le_bytes());
    entry(&mut image, 1, "KERN-A", KERN_LBA, ROOT_LBA - 1);
    entry(&mut image, 2, "ROOT-A", ROOT_LBA, ROOT_LBA + ROOT_SECTORS - 1);

    let superblock = (ROOT_LBA * 512 + 1024) as usize;
    image[superblock + 4..superblock + 8].copy_from_slice(&8u32.to_le_bytes());
    image[superblock + 56..superblock + 58].copy_from_slice(&0xEF53u16.to_le_bytes());
    image
}

#[tokio::test]
async fn unsigned_module_payload_is_published_with_description() {
    let h = Harness::new(FakeTools::default()).await;
    let (payload, out) = h.module_payload("dlc").await;

    let report = create_and_upload_payload(&h.ctx, payload, false, true)
        .await
        .unwrap();
    assert!(!report.signed);
    assert!(report.verified);
    assert_eq!(report.uri, out.display().to_string());

    assert_eq!(tokio::fs::read(&out).await.unwrap(), b"unsigned payload");
    let json: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(h.path("out/dlc.bin.json")).await.unwrap())
            .unwrap();
    assert_eq!(json["metadata_signature"], serde_json::Value::Null);
    assert_eq!(json["metadata_size"], 0);
    assert_eq!(json["version"], 2);
    assert!(h.path("out/dlc.bin.log").exists());
    assert!(!h.path("out/dlc.bin.metadata-signature").exists());

    assert!(!h.tools.called_with("--payload_signature_file="));
    let generate = h
        .tools
        .calls()
        .into_iter()
        .find(|c| c.iter().any(|a| a.starts_with("--partition_names=")))
        .unwrap();
    assert!(generate.contains(&"--partition_names=dlc/sample-dlc/package".to_string()));
    assert!(!generate
        .iter()
        .any(|a| a.starts_with("--new_postinstall_config_file=")));

    // The temporary working directory is gone.
    let mut work = tokio::fs::read_dir(h.path("work")).await.unwrap();
    assert!(work.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn delta_extracts_partitions_and_writes_postinstall_config() {
    let h = Harness::new(FakeTools::default()).await;
    let src = h.path("src.bin");
    let tgt = h.path("tgt.bin");
    tokio::fs::write(&src, disk_image()).await.unwrap();
    tokio::fs::write(&tgt, disk_image()).await.unwrap();

    let payload = Payload::delta(
        Image::from_uri(src.display().to_string()),
        Image::from_uri(tgt.display().to_string()),
    )
    .unwrap()
    .with_uri(h.path("out/delta.bin").display().to_string());
    let work_dir = h.path("run");
    let run = PaygenPayload::new(h.ctx.clone(), payload, &work_dir, false, false, None);
    let files = run.files().clone();
    let report = run.run().await.unwrap();
    assert!(report.delta);
    assert!(!report.verified);

    assert_eq!(
        tokio::fs::read_to_string(&files.postinstall_config)
            .await
            .unwrap(),
        "RUN_POSTINSTALL_root=true\n"
    );
    let root = tokio::fs::metadata(work_dir.join("tgt_root.bin")).await.unwrap();
    assert_eq!(root.len(), 8 * 1024);
    assert!(work_dir.join("src_kernel.bin").exists());

    let generate = h
        .tools
        .calls()
        .into_iter()
        .find(|c| c.iter().any(|a| a.starts_with("--partition_names=")))
        .unwrap();
    assert!(generate.contains(&"--partition_names=root:kernel".to_string()));
    assert!(generate.iter().any(|a| a.starts_with("--old_partitions=")));
    assert!(generate.contains(&format!(
        "--new_postinstall_config_file={}",
        files.postinstall_config.display()
    )));
}

fn leftover_archives(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("image-archive-"))
        .collect()
}

#[tokio::test]
async fn archive_images_are_unpacked_before_extraction() {
    let h = Harness::new(FakeTools::default()).await;
    let archive = h.path("image.tar.xz");
    tokio::fs::write(&archive, b"xz archive").await.unwrap();
    let build = Build::release("test-bucket", "dev-channel", "eve", "12000.0.0").unwrap();
    let payload = Payload::full(
        Image::archive(build, Some("R80".into()), ImageType::Test)
            .with_uri(archive.display().to_string()),
    )
    .with_uri(h.path("out/archive.bin").display().to_string());

    let work_dir = h.path("run");
    let run = PaygenPayload::new(h.ctx.clone(), payload, &work_dir, false, false, None);
    let files = run.files().clone();
    run.run().await.unwrap();

    let tar = h
        .tools
        .calls()
        .into_iter()
        .find(|c| c[0] == "tar")
        .unwrap();
    assert_eq!(tar[1], "-xJf");
    assert!(tar[2].contains("image-archive-"));
    assert_eq!(tar[3], "chromiumos_test_image.bin");

    assert_eq!(tokio::fs::read(&files.tgt_image).await.unwrap(), disk_image());
    assert!(!work_dir.join("chromiumos_test_image.bin").exists());
    assert!(leftover_archives(&work_dir).is_empty());
    assert!(work_dir.join("tgt_root.bin").exists());
}

#[tokio::test]
async fn signed_archives_are_used_as_raw_images() {
    let h = Harness::new(FakeTools::default()).await;
    let image = h.path("signed.bin");
    tokio::fs::write(&image, disk_image()).await.unwrap();
    let build = Build::release("test-bucket", "dev-channel", "eve", "12000.0.0").unwrap();
    let payload = Payload::full(
        Image::archive(build, None, ImageType::Signed).with_uri(image.display().to_string()),
    )
    .with_uri(h.path("out/signed-archive.bin").display().to_string());

    let work_dir = h.path("run");
    let run = PaygenPayload::new(h.ctx.clone(), payload, &work_dir, false, false, None);
    let files = run.files().clone();
    run.run().await.unwrap();

    assert!(!h.tools.calls().iter().any(|c| c[0] == "tar"));
    assert_eq!(tokio::fs::read(&files.tgt_image).await.unwrap(), disk_image());
    assert!(leftover_archives(&work_dir).is_empty());
}

#[tokio::test]
async fn signed_payload_carries_metadata_signature_and_is_checked_with_key() {
    let h = Harness::new(FakeTools::default()).await;
    let (payload, out) = h.module_payload("signed").await;
    let key = h.path("key.pem");

    let work_dir = h.path("run");
    let report = PaygenPayload::new(h.ctx.clone(), payload, &work_dir, true, true, Some(key))
        .with_signer(Arc::new(FakeSigner::good()))
        .run()
        .await
        .unwrap();

    let expected = STANDARD.encode([2u8; 256]);
    assert!(report.signed);
    assert_eq!(report.metadata_size, 4321);
    assert_eq!(report.description.metadata_signature.as_deref(), Some(expected.as_str()));

    assert_eq!(tokio::fs::read(&out).await.unwrap(), b"signed payload");
    assert_eq!(
        tokio::fs::read_to_string(h.path("out/signed.bin.metadata-signature"))
            .await
            .unwrap(),
        expected
    );
    assert_eq!(
        tokio::fs::read(work_dir.join("payload-signature-0.bin"))
            .await
            .unwrap(),
        vec![1u8; 256]
    );

    let check = h
        .tools
        .calls()
        .into_iter()
        .find(|c| c[0] == "check_update_payload")
        .unwrap();
    let key_at = check.iter().position(|a| a == "--key").unwrap();
    assert_eq!(check[key_at + 1], work_dir.join("public_key.pem").display().to_string());
    let size_at = check.iter().position(|a| a == "--metadata-size").unwrap();
    assert_eq!(check[size_at + 1], "4321");
    assert!(check.contains(&"--meta-sig".to_string()));
}

#[tokio::test]
async fn diff_tool_failure_stops_the_run_with_its_output() {
    let h = Harness::new(FakeTools {
        fail_generate: true,
        ..FakeTools::default()
    })
    .await;
    let (payload, out) = h.module_payload("broken").await;
    let work_dir = h.path("run");

    let err = PaygenPayload::new(h.ctx.clone(), payload, &work_dir, false, false, None)
        .run()
        .await
        .unwrap_err();
    match err {
        Error::Platform(PlatformError::CommandFailed { output, .. }) => {
            assert!(output.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!h.tools.called_with("--out_hash_file="));
    assert!(!out.exists());
    let log = tokio::fs::read_to_string(work_dir.join("delta.log"))
        .await
        .unwrap();
    assert!(log.starts_with("Output of command: delta_generator"));
    assert!(log.contains("boom"));
}

#[tokio::test]
async fn malformed_signer_results_never_reach_insertion() {
    let h = Harness::new(FakeTools::default()).await;
    let (payload, out) = h.module_payload("rejected").await;

    let err = PaygenPayload::new(
        h.ctx.clone(),
        payload,
        &h.path("run"),
        true,
        false,
        Some(h.path("key.pem")),
    )
    .with_signer(Arc::new(FakeSigner::short_signatures()))
    .run()
    .await
    .unwrap_err();

    assert!(err.is_signer_contract_violation());
    assert!(matches!(
        err,
        Error::Signing(SigningError::UnexpectedSignerResults { .. })
    ));
    assert!(!h.tools.called_with("--payload_signature_file="));
    assert!(!out.exists());
}

#[tokio::test]
async fn metadata_hash_is_copied_out_for_explicit_requests() {
    let h = Harness::new(FakeTools::default()).await;
    let tgt = h.path("tgt.bin");
    tokio::fs::write(&tgt, disk_image()).await.unwrap();
    let hash_out = h.path("hashes/metadata_hash");

    let report = generate_update_payload(
        &h.ctx,
        GenerateRequest {
            image: tgt.display().to_string(),
            output: h.path("out/full.bin").display().to_string(),
            out_metadata_hash_file: Some(hash_out.clone()),
            ..GenerateRequest::default()
        },
    )
    .await
    .unwrap();

    assert!(!report.signed);
    assert!(!report.delta);
    assert_eq!(tokio::fs::read(&hash_out).await.unwrap(), vec![0x22; 32]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_two_diff_tools_run_at_once() {
    let h = Harness::new(FakeTools {
        generate_delay: Duration::from_millis(100),
        ..FakeTools::default()
    })
    .await;

    let mut payloads = Vec::new();
    for i in 0..5 {
        payloads.push(h.module_payload(&format!("p{i}")).await.0);
    }
    let (published, _) = h.module_payload("published").await;
    payloads.push(published.with_exists(true));

    let report = generate_payloads(&h.ctx, payloads, false, false).await;
    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 5);
    assert_eq!(report.skipped.len(), 1);

    let peak = h.tools.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency was {peak}");
    assert!(peak >= 1);
    assert_eq!(h.ctx.resources.available_generator_permits(), 2);
}
