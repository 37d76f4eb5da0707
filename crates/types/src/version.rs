//! Build version ordering
//!
//! Build versions are dot-separated integers. Three components are new-style
//! (`3015.0.0`), four are old-style (`0.12.433.257`). Every old-style version
//! orders below every new-style version regardless of the numbers involved.

use paygen_errors::{Error, VersionError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildVersion {
    components: Vec<u64>,
}

impl BuildVersion {
    /// Parse a build version string.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidFormat` when a component is not an
    /// unsigned integer or the component count is neither 3 nor 4.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let components = input
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VersionError::InvalidFormat {
                input: input.to_string(),
                reason: e.to_string(),
            })?;

        if !matches!(components.len(), 3 | 4) {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
                reason: format!("expected 3 or 4 components, got {}", components.len()),
            }
            .into());
        }

        Ok(Self { components })
    }

    #[must_use]
    pub fn is_new_style(&self) -> bool {
        self.components.len() == 3
    }

    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Comparison key: `1.2.3` becomes `[1, 0, 1, 2, 3]` and `0.12.3.4`
    /// becomes `[0, 0, 12, 3, 4]`.
    fn sort_key(&self) -> Vec<u64> {
        let prefix: &[u64] = if self.is_new_style() { &[1, 0] } else { &[0] };
        prefix.iter().chain(&self.components).copied().collect()
    }
}

impl Ord for BuildVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for BuildVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for BuildVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// `left > right` under build version ordering.
///
/// # Errors
///
/// Returns `VersionError::InvalidFormat` if either version is malformed.
pub fn version_greater(left: &str, right: &str) -> Result<bool, Error> {
    Ok(BuildVersion::parse(left)? > BuildVersion::parse(right)?)
}
