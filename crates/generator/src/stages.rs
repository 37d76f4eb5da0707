//! Values passed between pipeline stages
//!
//! Each stage consumes the value produced by its predecessor and returns the
//! next one. Fields are crate-private, so outside code cannot skip a stage by
//! building a later value by hand.

use std::path::PathBuf;

use crate::description::PayloadDescription;

/// Nothing done yet; the working directory exists.
#[derive(Debug)]
pub struct Prepared {
    pub(crate) _private: (),
}

/// Raw target (and source) images are in the working directory.
#[derive(Debug)]
pub struct ImagesFetched {
    pub(crate) tgt_image: PathBuf,
    pub(crate) src_image: Option<PathBuf>,
}

/// Partition files and the postinstall config are in place.
#[derive(Debug)]
pub struct PartitionsExtracted {
    pub(crate) postinstall_config: Option<PathBuf>,
}

/// The diff tool produced an unsigned payload.
#[derive(Debug)]
pub struct UnsignedPayload {
    pub(crate) path: PathBuf,
}

/// Payload and metadata hashes of the unsigned payload.
#[derive(Debug)]
pub struct HashesComputed {
    pub(crate) unsigned: PathBuf,
    pub(crate) payload_hash: Vec<u8>,
    pub(crate) metadata_hash: Vec<u8>,
}

/// The payload that will be published, signed or not.
#[derive(Debug)]
pub struct FinalPayload {
    pub(crate) path: PathBuf,
    pub(crate) metadata_size: u64,
    /// Base64 metadata signature and the sidecar file holding it
    pub(crate) metadata_signature: Option<(String, PathBuf)>,
}

impl FinalPayload {
    pub(crate) fn unsigned(path: PathBuf) -> Self {
        Self {
            path,
            metadata_size: 0,
            metadata_signature: None,
        }
    }

    pub(crate) fn is_signed(&self) -> bool {
        self.metadata_signature.is_some()
    }
}

/// The description document has been written.
#[derive(Debug)]
pub struct Described {
    pub(crate) payload: FinalPayload,
    pub(crate) description: PayloadDescription,
    pub(crate) size: u64,
}

/// Checked by the payload checker, or verification was not requested.
#[derive(Debug)]
pub struct Verified {
    pub(crate) described: Described,
    pub(crate) checked: bool,
}

/// Payload and sidecars are at their destination.
#[derive(Debug)]
pub struct Uploaded {
    pub(crate) verified: Verified,
    pub(crate) uri: String,
}
