//! Fixed names and default values shared by the pipeline crates

/// Directory name under the user cache directory holding the download cache.
pub const CACHE_DIR_NAME: &str = "paygen_cache";

/// Default cache capacity: 50 GiB.
pub const DEFAULT_CACHE_CAPACITY: u64 = 50 * 1024 * 1024 * 1024;

/// Concurrent diff-generation invocations per process.
pub const DEFAULT_CONCURRENT_GENERATORS: usize = 2;

/// Default external tool timeout in seconds (3 hours). Zero disables it.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3 * 60 * 60;

/// Keysets every payload hash is signed with.
pub const DEFAULT_KEYSETS: &[&str] = &["update_signer"];

/// Byte length of one signature per keyset (2048-bit RSA).
pub const DEFAULT_SIGNATURE_SIZES: &[usize] = &[256];

/// Payload description schema version.
pub const DESCRIPTION_FILE_VERSION: u32 = 2;

/// Testing key location relative to the paygen config directory.
pub const TESTING_KEY_RELATIVE: &str = "ssh_keys/testing_rsa";
