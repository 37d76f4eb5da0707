#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Storage access for paygen
//!
//! Images, payloads and signing tickets live behind URIs: local paths,
//! `gs://` objects, or `http(s)://` URLs. [`ObjectStore`] is the seam the
//! cache, the signer and the generator use to move bytes; [`UriStorage`]
//! dispatches each URI to the right transport.

mod client;
mod storage;
mod uri;

pub use client::{NetClient, NetConfig};
pub use storage::{copy, ObjectStore, UriStorage};
pub use uri::{local_path, uri_type, UriType};

use paygen_errors::{Error, NetworkError};
use url::Url;

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}
