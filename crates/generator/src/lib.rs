#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Update payload generation
//!
//! A run takes a target image, and for a delta a source image, through a
//! fixed chain of stages: fetch, extract partitions, generate the unsigned
//! payload, compute hashes, sign and insert signatures, describe, verify and
//! upload. Each stage hands the next a value that only it can produce, so
//! stages cannot be skipped or reordered. Signing and verification are
//! optional.
//!
//! Diff tool invocations are bounded process-wide by the context's
//! [`ResourceManager`](paygen_resources::ResourceManager), however many runs
//! are in flight.

mod api;
mod context;
mod description;
mod layout;
mod payload;
mod report;
mod stages;
mod tools;

pub use api::{
    create_and_upload_payload, generate_payloads, generate_update_payload, GenerateRequest,
};
pub use context::{GeneratorContext, GeneratorContextBuilder};
pub use description::PayloadDescription;
pub use layout::{PartitionPlan, WorkFiles, METADATA_SIGNATURE_SUFFIX};
pub use payload::PaygenPayload;
pub use report::{BatchReport, RunReport};
pub use stages::{
    Described, FinalPayload, HashesComputed, ImagesFetched, PartitionsExtracted, Prepared,
    UnsignedPayload, Uploaded, Verified,
};
