#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Canonical storage locations and file names for release artifacts
//!
//! Everything here is a pure function of its arguments except
//! [`random_suffix`]. Builders produce `gs://` URIs in the release bucket
//! layout; parsers recognise those URIs again and return `None` for anything
//! that does not match a known template.

mod names;
mod parse;
mod uri;

pub use names::{
    image_name, module_image_name, module_payload_name, payload_name, random_suffix,
    unsigned_image_archive_name, ModuleId, UNSIGNED_KEY_DEFAULT,
};
pub use parse::{
    parse_image_uri, parse_module_image_uri, parse_payload_uri, parse_unsigned_image_uri,
};
pub use uri::{
    archive_build_uri, build_uri, flag_uri, image_uri, module_image_uri, module_images_uri,
    module_payload_uri, payload_uri, payload_uri_for, payloads_uri, resolve_image_uri,
    signing_uri, unsigned_image_uri, BuildFlag,
};

/// Bucket holding official release builds.
pub const RELEASES_BUCKET: &str = "chromeos-releases";

/// Bucket holding release builds used for testing.
pub const TEST_BUCKET: &str = "chromeos-releases-test";

/// Bucket holding builder output archives.
pub const IMAGE_ARCHIVE_BUCKET: &str = "chromeos-image-archive";
