//! Release build coordinates

use paygen_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A release coordinate: where a build lives in the release bucket.
///
/// Immutable once constructed; equality is by all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Build {
    pub bucket: String,
    pub channel: String,
    pub board: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Build {
    /// Create a build with only board and version set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if board or version is empty.
    pub fn new(board: impl Into<String>, version: impl Into<String>) -> Result<Self, Error> {
        let board = board.into();
        let version = version.into();
        require("board", &board)?;
        require("version", &version)?;
        Ok(Self {
            bucket: String::new(),
            channel: String::new(),
            board,
            version,
            uri: None,
        })
    }

    /// Create a fully addressed build in a release bucket.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if any coordinate is empty.
    pub fn release(
        bucket: impl Into<String>,
        channel: impl Into<String>,
        board: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, Error> {
        let bucket = bucket.into();
        let channel = channel.into();
        require("bucket", &bucket)?;
        require("channel", &channel)?;
        Ok(Self {
            bucket,
            channel,
            ..Self::new(board, version)?
        })
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Same build at a different version.
    #[must_use]
    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Check that the fields needed to address the build in a bucket are set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` naming the first empty field.
    pub fn require_addressable(&self) -> Result<(), Error> {
        require("bucket", &self.bucket)?;
        require("channel", &self.channel)?;
        require("board", &self.board)?;
        require("version", &self.version)
    }
}

fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(ConfigError::MissingField {
            field: format!("build.{field}"),
        }
        .into());
    }
    Ok(())
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.bucket, self.channel, self.board, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_rejected() {
        let err = Build::new("", "1.2.3").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField { ref field }) if field == "build.board"
        ));
    }

    #[test]
    fn release_requires_channel() {
        assert!(Build::release("chromeos-releases", "", "lumpy", "1.2.3").is_err());
        let build = Build::release("chromeos-releases", "stable-channel", "lumpy", "1.2.3")
            .unwrap();
        assert!(build.require_addressable().is_ok());
        assert_eq!(build.to_string(), "chromeos-releases:stable-channel/lumpy/1.2.3");
    }

    #[test]
    fn at_version_keeps_other_fields() {
        let build = Build::release("b", "c", "lumpy", "2.0.0").unwrap();
        let older = build.at_version("1.0.0");
        assert_eq!(older.version, "1.0.0");
        assert_eq!(older.board, "lumpy");
        assert_ne!(older, build);
    }
}
