//! Payload descriptions

use crate::{Build, Image};
use paygen_errors::{Error, PayloadError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A full or delta update payload to be generated.
///
/// Built through [`Payload::full`] or [`Payload::delta`] so a delta never
/// pairs a module image with a disk image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    tgt_image: Image,
    src_image: Option<Image>,
    /// Build the payload is published under; defaults to the target's build.
    build: Option<Build>,
    uri: Option<String>,
    /// Set when the payload is already published and generation can be skipped.
    #[serde(default)]
    exists: bool,
}

impl Payload {
    /// A full payload for `tgt_image`.
    #[must_use]
    pub fn full(tgt_image: Image) -> Self {
        let build = tgt_image.build.clone();
        Self {
            tgt_image,
            src_image: None,
            build,
            uri: None,
            exists: false,
        }
    }

    /// A delta payload from `src_image` to `tgt_image`.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::InvalidPayload` if one image is a module image
    /// and the other is not.
    pub fn delta(src_image: Image, tgt_image: Image) -> Result<Self, Error> {
        if src_image.is_module() != tgt_image.is_module() {
            return Err(PayloadError::InvalidPayload {
                message: format!(
                    "delta source {src_image} and target {tgt_image} are different image kinds"
                ),
            }
            .into());
        }
        Ok(Self {
            src_image: Some(src_image),
            ..Self::full(tgt_image)
        })
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_build(mut self, build: Build) -> Self {
        self.build = Some(build);
        self
    }

    #[must_use]
    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    #[must_use]
    pub fn tgt_image(&self) -> &Image {
        &self.tgt_image
    }

    #[must_use]
    pub fn src_image(&self) -> Option<&Image> {
        self.src_image.as_ref()
    }

    /// Destination URI, if one was assigned.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn is_delta(&self) -> bool {
        self.src_image.is_some()
    }

    #[must_use]
    pub fn is_module(&self) -> bool {
        self.tgt_image.is_module()
    }

    /// Build the payload belongs to.
    #[must_use]
    pub fn owning_build(&self) -> Option<&Build> {
        self.build.as_ref().or(self.tgt_image.build.as_ref())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uri) = &self.uri {
            return f.write_str(uri.rsplit('/').next().unwrap_or(uri));
        }
        match &self.src_image {
            Some(src) => write!(f, "{src} -> {} (no uri)", self.tgt_image),
            None => write!(f, "any -> {} (no uri)", self.tgt_image),
        }
    }
}
