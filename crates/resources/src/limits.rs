//! Resource limit configuration

use paygen_config::constants::DEFAULT_CONCURRENT_GENERATORS;
use serde::{Deserialize, Serialize};

/// Resource limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of generator invocations in flight at once
    pub concurrent_generators: usize,
}

impl ResourceLimits {
    /// Resource limits for tests: a single generator slot.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            concurrent_generators: 1,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            concurrent_generators: DEFAULT_CONCURRENT_GENERATORS,
        }
    }
}

/// Conversion from configuration types into `ResourceLimits`
pub trait IntoResourceLimits {
    fn into_resource_limits(self) -> ResourceLimits;
}

impl IntoResourceLimits for &paygen_config::Config {
    fn into_resource_limits(self) -> ResourceLimits {
        ResourceLimits {
            concurrent_generators: self.limits.concurrent_generators.max(1),
        }
    }
}

impl IntoResourceLimits for ResourceLimits {
    fn into_resource_limits(self) -> ResourceLimits {
        self
    }
}
