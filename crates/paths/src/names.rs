//! Artifact file names

use paygen_types::ImageType;

/// Key label used in payload names when the payload is not signed.
pub const UNSIGNED_KEY_DEFAULT: &str = "test";

/// Identity of a module within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleId<'a> {
    pub dlc_id: &'a str,
    pub dlc_package: &'a str,
}

/// `chromeos_<version>_<board>_<image_type>_<channel>_<key>.bin`
#[must_use]
pub fn image_name(
    channel: &str,
    board: &str,
    version: &str,
    key: &str,
    image_type: ImageType,
) -> String {
    format!("chromeos_{version}_{board}_{image_type}_{channel}_{key}.bin")
}

/// File name of a module image inside its module directory.
#[must_use]
pub fn module_image_name() -> &'static str {
    "dlc.img"
}

/// `ChromeOS-<image_type>-<milestone>-<version>-<board>.tar.xz`
///
/// `milestone` is the branch label, for example `R19`.
#[must_use]
pub fn unsigned_image_archive_name(
    board: &str,
    version: &str,
    milestone: &str,
    image_type: ImageType,
) -> String {
    format!("ChromeOS-{image_type}-{milestone}-{version}-{board}.tar.xz")
}

/// Payload file name.
///
/// A payload signed with `key` gets the `.signed` extension. Without a key the
/// unsigned image type stands in for the key label. A `random` of `None`
/// draws a fresh suffix, so names are not reproducible across calls.
#[must_use]
pub fn payload_name(
    channel: &str,
    board: &str,
    version: &str,
    key: Option<&str>,
    random: Option<&str>,
    src_version: Option<&str>,
    unsigned_image_type: Option<&str>,
) -> String {
    let random = random.map_or_else(random_suffix, str::to_string);
    let (key, ext) = match key {
        Some(key) => (key, ".signed"),
        None => (unsigned_image_type.unwrap_or(UNSIGNED_KEY_DEFAULT), ""),
    };

    match src_version {
        Some(src) => format!(
            "chromeos_{src}-{version}_{board}_{channel}_delta_{key}.bin-{random}{ext}"
        ),
        None => format!("chromeos_{version}_{board}_{channel}_full_{key}.bin-{random}{ext}"),
    }
}

/// Payload file name for a module image.
#[must_use]
pub fn module_payload_name(
    channel: &str,
    board: &str,
    version: &str,
    module: ModuleId<'_>,
    random: Option<&str>,
    src_version: Option<&str>,
    sign: bool,
) -> String {
    let random = random.map_or_else(random_suffix, str::to_string);
    let ext = if sign { ".signed" } else { "" };
    let ModuleId {
        dlc_id,
        dlc_package,
    } = module;

    match src_version {
        Some(src) => format!(
            "dlc_{dlc_id}_{dlc_package}_{src}-{version}_{board}_{channel}_delta.bin-{random}{ext}"
        ),
        None => format!(
            "dlc_{dlc_id}_{dlc_package}_{version}_{board}_{channel}_full.bin-{random}{ext}"
        ),
    }
}

/// 32 lowercase hex characters drawn from 128 random bits.
#[must_use]
pub fn random_suffix() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_name_template() {
        assert_eq!(
            image_name("blah-channel", "board-name", "1.2.3", "key", ImageType::Recovery),
            "chromeos_1.2.3_board-name_recovery_blah-channel_key.bin"
        );
    }

    #[test]
    fn payload_names_signed_and_unsigned() {
        assert_eq!(
            payload_name(
                "stable-channel",
                "x86-alex",
                "2913.377.0",
                Some("mp-v3"),
                Some("610c97c30fae8561bde01a6116d65cb9"),
                None,
                None,
            ),
            "chromeos_2913.377.0_x86-alex_stable-channel_full_mp-v3.bin-610c97c30fae8561bde01a6116d65cb9.signed"
        );
        assert_eq!(
            payload_name(
                "stable-channel",
                "x86-alex",
                "2913.377.0",
                None,
                Some("b334762d0f6b80f471069153bbe8b97a"),
                Some("0.12.433.257"),
                None,
            ),
            "chromeos_0.12.433.257-2913.377.0_x86-alex_stable-channel_delta_test.bin-b334762d0f6b80f471069153bbe8b97a"
        );
    }

    #[test]
    fn module_payload_names() {
        let module = ModuleId {
            dlc_id: "sample-dlc",
            dlc_package: "sample-package",
        };
        assert_eq!(
            module_payload_name(
                "canary-channel",
                "kevin",
                "11869.0.0",
                module,
                Some("250bc111ea4955aebc2af08db1f1773c"),
                None,
                true,
            ),
            "dlc_sample-dlc_sample-package_11869.0.0_kevin_canary-channel_full.bin-250bc111ea4955aebc2af08db1f1773c.signed"
        );
        assert!(module_payload_name("c", "b", "2.0.0", module, Some("ab"), Some("1.0.0"), false)
            .ends_with("_1.0.0-2.0.0_b_c_delta.bin-ab"));
    }

    #[test]
    fn random_suffix_shape() {
        let a = random_suffix();
        let b = random_suffix();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn archive_name_template() {
        assert_eq!(
            unsigned_image_archive_name("board-name", "1.2.3", "R19", ImageType::Test),
            "ChromeOS-test-R19-1.2.3-board-name.tar.xz"
        );
    }
}
