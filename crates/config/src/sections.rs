//! Configuration sections

use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONCURRENT_GENERATORS,
    DEFAULT_KEYSETS, DEFAULT_SIGNATURE_SIZES,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub cache_dir: Option<PathBuf>,
    pub work_root: Option<PathBuf>,
    pub testing_private_key: Option<PathBuf>,
}

/// Download cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// External tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_delta_generator")]
    pub delta_generator: String,
    #[serde(default = "default_payload_checker")]
    pub payload_checker: String,
    #[serde(default = "default_tar")]
    pub tar: String,
    #[serde(default = "default_openssl")]
    pub openssl: String,
    #[serde(default = "default_gsutil")]
    pub gsutil: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64, // 0 = no timeout
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            delta_generator: default_delta_generator(),
            payload_checker: default_payload_checker(),
            tar: default_tar(),
            openssl: default_openssl(),
            gsutil: default_gsutil(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_concurrent_generators")]
    pub concurrent_generators: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            concurrent_generators: DEFAULT_CONCURRENT_GENERATORS,
        }
    }
}

/// Signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Payloads published to this bucket are signed by the signing service.
    #[serde(default = "default_official_bucket")]
    pub official_bucket: String,
    #[serde(default = "default_keysets")]
    pub keysets: Vec<String>,
    #[serde(default = "default_signature_sizes")]
    pub signature_sizes: Vec<usize>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_signing_timeout_secs")]
    pub timeout_secs: u64,
    pub public_key_uri: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            official_bucket: default_official_bucket(),
            keysets: default_keysets(),
            signature_sizes: default_signature_sizes(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_signing_timeout_secs(),
            public_key_uri: None,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

// Default value functions for serde
fn default_capacity_bytes() -> u64 {
    DEFAULT_CACHE_CAPACITY
}

fn default_delta_generator() -> String {
    "delta_generator".to_string()
}

fn default_payload_checker() -> String {
    "check_update_payload".to_string()
}

fn default_tar() -> String {
    "tar".to_string()
}

fn default_openssl() -> String {
    "openssl".to_string()
}

fn default_gsutil() -> String {
    "gsutil".to_string()
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_concurrent_generators() -> usize {
    DEFAULT_CONCURRENT_GENERATORS
}

fn default_official_bucket() -> String {
    "chromeos-releases".to_string()
}

fn default_keysets() -> Vec<String> {
    DEFAULT_KEYSETS.iter().map(ToString::to_string).collect()
}

fn default_signature_sizes() -> Vec<usize> {
    DEFAULT_SIGNATURE_SIZES.to_vec()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_signing_timeout_secs() -> u64 {
    30 * 60
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}
