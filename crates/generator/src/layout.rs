//! Fixed file names inside a run's working directory

use paygen_types::{ImageKind, Payload};
use std::path::{Path, PathBuf};

pub(crate) const ROOT: &str = "root";
pub(crate) const KERNEL: &str = "kernel";

/// Suffix of the base64 metadata signature stored next to a signed payload.
pub const METADATA_SIGNATURE_SUFFIX: &str = ".metadata-signature";

/// Every intermediate artifact of a run, relative to its working directory.
#[derive(Debug, Clone)]
pub struct WorkFiles {
    pub work_dir: PathBuf,
    pub src_image: PathBuf,
    pub tgt_image: PathBuf,
    pub payload: PathBuf,
    pub signed_payload: PathBuf,
    pub metadata_signature: PathBuf,
    pub log: PathBuf,
    pub description: PathBuf,
    pub metadata_size: PathBuf,
    pub metadata_hash: PathBuf,
    pub payload_hash: PathBuf,
    pub postinstall_config: PathBuf,
    pub public_key: PathBuf,
}

impl WorkFiles {
    #[must_use]
    pub fn new(work_dir: &Path) -> Self {
        let at = |name: &str| work_dir.join(name);
        let signed_payload = at("delta.bin.signed");
        Self {
            work_dir: work_dir.to_path_buf(),
            src_image: at("src_image.bin"),
            tgt_image: at("tgt_image.bin"),
            payload: at("delta.bin"),
            metadata_signature: sidecar(&signed_payload, METADATA_SIGNATURE_SUFFIX),
            signed_payload,
            log: at("delta.log"),
            description: at("delta.json"),
            metadata_size: at("metadata_size.txt"),
            metadata_hash: at("metadata_hash"),
            payload_hash: at("payload_hash"),
            postinstall_config: at("postinstall_config"),
            public_key: at("public_key.pem"),
        }
    }

    /// File a signature is written to before insertion.
    pub(crate) fn signature_file(&self, kind: &str, index: usize) -> PathBuf {
        self.work_dir.join(format!("{kind}-signature-{index}.bin"))
    }
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Partitions handed to the diff tool and the files holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub names: Vec<String>,
    pub tgt: Vec<PathBuf>,
    pub src: Vec<PathBuf>,
    /// Partitions must be cut out of whole-disk images first.
    pub extract: bool,
}

impl PartitionPlan {
    /// Module images are a single partition used as is; everything else is
    /// a disk image with a root and kernel partition, in that order.
    #[must_use]
    pub fn for_payload(payload: &Payload, files: &WorkFiles) -> Self {
        match &payload.tgt_image().kind {
            ImageKind::Module {
                dlc_id,
                dlc_package,
                ..
            } => Self {
                names: vec![format!("dlc/{dlc_id}/{dlc_package}")],
                tgt: vec![files.tgt_image.clone()],
                src: vec![files.src_image.clone()],
                extract: false,
            },
            ImageKind::Standard | ImageKind::Archive { .. } => {
                let names = [ROOT, KERNEL];
                Self {
                    names: names.iter().map(ToString::to_string).collect(),
                    tgt: names
                        .iter()
                        .map(|n| files.work_dir.join(format!("tgt_{n}.bin")))
                        .collect(),
                    src: names
                        .iter()
                        .map(|n| files.work_dir.join(format!("src_{n}.bin")))
                        .collect(),
                    extract: true,
                }
            }
        }
    }
}
