use std::path::PathBuf;

/// Transport a URI resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriType {
    Local,
    GoogleStorage,
    Http,
}

/// Classify a URI by scheme. Anything without a known remote scheme is local.
#[must_use]
pub fn uri_type(uri: &str) -> UriType {
    if uri.starts_with("gs://") {
        UriType::GoogleStorage
    } else if uri.starts_with("http://") || uri.starts_with("https://") {
        UriType::Http
    } else {
        UriType::Local
    }
}

/// Filesystem path for a local URI (`file://` stripped).
#[must_use]
pub fn local_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}
