//! Image references
//!
//! An [`Image`] names a build artifact either by URI or by the coordinates
//! needed to derive its canonical URI. [`ImageKind`] distinguishes raw disk
//! images, unsigned image archives, and single-partition module images; every
//! stage that branches on the kind matches on it exhaustively.

use crate::Build;
use paygen_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image type as it appears in image and archive names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Recovery,
    Base,
    Test,
    Signed,
}

impl ImageType {
    /// Image types published as unsigned archives.
    pub const UNSIGNED: [ImageType; 3] = [ImageType::Test, ImageType::Recovery, ImageType::Base];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Base => "base",
            Self::Test => "test",
            Self::Signed => "signed",
        }
    }

    /// Member of an unsigned image archive holding this image type.
    ///
    /// `None` means the artifact is already a raw image.
    #[must_use]
    pub fn archive_member(self) -> Option<&'static str> {
        match self {
            Self::Signed => None,
            Self::Test => Some("chromiumos_test_image.bin"),
            Self::Recovery => Some("chromiumos_recovery_image.bin"),
            Self::Base => Some("chromiumos_base_image.bin"),
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recovery" => Ok(Self::Recovery),
            "base" => Ok(Self::Base),
            "test" => Ok(Self::Test),
            "signed" => Ok(Self::Signed),
            other => Err(ConfigError::UnknownImageType {
                value: other.to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageKind {
    /// A raw whole-disk image.
    Standard,
    /// An unsigned image archive; the member to unpack follows the image type.
    Archive { milestone: Option<String> },
    /// A single-partition downloadable content module.
    Module {
        dlc_id: String,
        dlc_package: String,
        dlc_image: String,
    },
}

impl ImageKind {
    #[must_use]
    pub fn is_module(&self) -> bool {
        matches!(self, Self::Module { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    pub build: Option<Build>,
    pub kind: ImageKind,
    pub image_type: ImageType,
    /// Signing key label ("mp", "premp", ...).
    pub key: Option<String>,
    /// Channel of the image when it differs from its build directory.
    pub image_channel: Option<String>,
    /// Version of the image when it differs from its build directory.
    pub image_version: Option<String>,
    pub uri: Option<String>,
}

impl Image {
    /// A standard image addressed by build coordinates.
    #[must_use]
    pub fn new(build: Build, image_type: ImageType, key: Option<String>) -> Self {
        Self {
            build: Some(build),
            kind: ImageKind::Standard,
            image_type,
            key,
            image_channel: None,
            image_version: None,
            uri: None,
        }
    }

    /// A standard image known only by its location.
    #[must_use]
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            build: None,
            kind: ImageKind::Standard,
            image_type: ImageType::default(),
            key: None,
            image_channel: None,
            image_version: None,
            uri: Some(uri.into()),
        }
    }

    /// An unsigned image archive of the given type.
    #[must_use]
    pub fn archive(build: Build, milestone: Option<String>, image_type: ImageType) -> Self {
        Self {
            kind: ImageKind::Archive { milestone },
            ..Self::new(build, image_type, None)
        }
    }

    /// A module image of the given build.
    #[must_use]
    pub fn module(
        build: Build,
        dlc_id: impl Into<String>,
        dlc_package: impl Into<String>,
        dlc_image: impl Into<String>,
    ) -> Self {
        Self {
            kind: ImageKind::Module {
                dlc_id: dlc_id.into(),
                dlc_package: dlc_package.into(),
                dlc_image: dlc_image.into(),
            },
            ..Self::new(build, ImageType::default(), None)
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ImageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set channel and version overrides; values equal to the build's own
    /// channel or version are dropped.
    #[must_use]
    pub fn with_overrides(mut self, channel: Option<String>, version: Option<String>) -> Self {
        self.image_channel = channel;
        self.image_version = version;
        self.normalize();
        self
    }

    fn normalize(&mut self) {
        if let Some(build) = &self.build {
            if self.image_channel.as_deref() == Some(build.channel.as_str()) {
                self.image_channel = None;
            }
            if self.image_version.as_deref() == Some(build.version.as_str()) {
                self.image_version = None;
            }
        }
    }

    #[must_use]
    pub fn is_module(&self) -> bool {
        self.kind.is_module()
    }

    /// Channel the image was built for.
    #[must_use]
    pub fn effective_channel(&self) -> Option<&str> {
        self.image_channel
            .as_deref()
            .or_else(|| self.build.as_ref().map(|b| b.channel.as_str()))
    }

    /// Version the image carries.
    #[must_use]
    pub fn effective_version(&self) -> Option<&str> {
        self.image_version
            .as_deref()
            .or_else(|| self.build.as_ref().map(|b| b.version.as_str()))
    }

    /// Check that the image can be located.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` when there is no URI and the build
    /// coordinates are insufficient to derive one.
    pub fn validate(&self) -> Result<(), Error> {
        if self.uri.is_some() {
            return Ok(());
        }
        let build = self.build.as_ref().ok_or_else(|| ConfigError::MissingField {
            field: "image.build".to_string(),
        })?;
        build.require_addressable()?;
        if matches!(self.kind, ImageKind::Standard) && self.key.is_none() {
            return Err(ConfigError::MissingField {
                field: "image.key".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uri) = &self.uri {
            return f.write_str(uri.rsplit('/').next().unwrap_or(uri));
        }
        match &self.build {
            Some(build) => write!(f, "{} image of {build}", self.image_type),
            None => write!(f, "{} image (no uri)", self.image_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Build {
        Build::release("chromeos-releases", "stable-channel", "lumpy", "3015.0.0").unwrap()
    }

    #[test]
    fn overrides_matching_build_are_cleared() {
        let image = Image::new(build(), ImageType::Recovery, Some("mp".into())).with_overrides(
            Some("stable-channel".into()),
            Some("3016.0.0".into()),
        );
        assert_eq!(image.image_channel, None);
        assert_eq!(image.image_version.as_deref(), Some("3016.0.0"));
        assert_eq!(image.effective_version(), Some("3016.0.0"));
        assert_eq!(image.effective_channel(), Some("stable-channel"));
    }

    #[test]
    fn unknown_image_type_is_config_error() {
        let err = "factory".parse::<ImageType>().unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownImageType { .. })
        ));
        assert_eq!("test".parse::<ImageType>().unwrap(), ImageType::Test);
    }

    #[test]
    fn archive_members_by_type() {
        assert_eq!(ImageType::Signed.archive_member(), None);
        assert_eq!(
            ImageType::Test.archive_member(),
            Some("chromiumos_test_image.bin")
        );
        assert_eq!(
            ImageType::Base.archive_member(),
            Some("chromiumos_base_image.bin")
        );
    }

    #[test]
    fn validate_requires_key_for_standard_images_without_uri() {
        let image = Image::new(build(), ImageType::Recovery, None);
        assert!(image.validate().is_err());
        assert!(image.clone().with_uri("/tmp/x.bin").validate().is_ok());
        let module = Image::module(build(), "sample-dlc", "package", "dlc.img");
        assert!(module.validate().is_ok());
    }
}
