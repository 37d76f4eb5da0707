//! Inverse of the URI builders
//!
//! Every path segment matches `[^/]+`, so a URI with an extra or missing
//! segment is not recognised. File names embed the board a second time; that
//! copy must equal the board directory.

use paygen_types::{Build, Image, ImageType, Payload};
use regex::{Captures, Regex};
use tracing::debug;

const BUILD_PREFIX: &str = r"^gs://([^/]+)/([^/]+)/([^/]+)/([^/]+)/";

fn captures<'h>(pattern: &str, haystack: &'h str) -> Option<Captures<'h>> {
    Regex::new(pattern).ok()?.captures(haystack)
}

fn group<'h>(caps: &Captures<'h>, i: usize) -> Option<&'h str> {
    caps.get(i).map(|m| m.as_str())
}

/// Split `gs://bucket/channel/board/version/<rest>` into its build and rest.
fn split_build<'h>(uri: &'h str, rest_pattern: &str) -> Option<(Build, Captures<'h>)> {
    let caps = captures(&format!("{BUILD_PREFIX}{rest_pattern}$"), uri)?;
    let build = Build {
        bucket: group(&caps, 1)?.to_string(),
        channel: group(&caps, 2)?.to_string(),
        board: group(&caps, 3)?.to_string(),
        version: group(&caps, 4)?.to_string(),
        uri: None,
    };
    Some((build, caps))
}

/// Strip `<board>_` from the front of `name`.
fn strip_board<'a>(name: &'a str, board: &str) -> Option<&'a str> {
    name.strip_prefix(board)?.strip_prefix('_')
}

/// Parse the URI of a signed image.
#[must_use]
pub fn parse_image_uri(uri: &str) -> Option<Image> {
    let (build, caps) = split_build(uri, r"chromeos_([^_/]+)_([^/]+)")?;
    let image_version = group(&caps, 5)?.to_string();
    let tail = strip_board(group(&caps, 6)?, &build.board)?;

    let tail_caps = captures(r"^([^_/]+)_([^_/]+)_([^_/]+)\.bin$", tail)?;
    let image_type: ImageType = group(&tail_caps, 1)?.parse().ok()?;
    let image_channel = group(&tail_caps, 2)?.to_string();
    let key = group(&tail_caps, 3)?.to_string();

    Some(
        Image::new(build, image_type, Some(key))
            .with_overrides(Some(image_channel), Some(image_version))
            .with_uri(uri),
    )
}

/// Parse the URI of an unsigned image archive.
#[must_use]
pub fn parse_unsigned_image_uri(uri: &str) -> Option<Image> {
    let types = ImageType::UNSIGNED.map(ImageType::as_str).join("|");
    let (build, caps) = split_build(uri, &format!(r"ChromeOS-({types})-(R[0-9]+)-([^/]+)"))?;
    let image_type: ImageType = group(&caps, 5)?.parse().ok()?;
    let milestone = group(&caps, 6)?.to_string();

    let expected_tail = format!("{}-{}.tar.xz", build.version, build.board);
    if group(&caps, 7)? != expected_tail {
        return None;
    }

    Some(Image::archive(build, Some(milestone), image_type).with_uri(uri))
}

/// Parse the URI of a module image.
#[must_use]
pub fn parse_module_image_uri(uri: &str) -> Option<Image> {
    let Some((build, caps)) = split_build(uri, r"dlc/([^/]+)/([^/]+)/([^/]+)") else {
        debug!(uri, "unparsable module image URI");
        return None;
    };
    let dlc_id = group(&caps, 5)?;
    let dlc_package = group(&caps, 6)?;
    let dlc_image = group(&caps, 7)?;
    Some(Image::module(build, dlc_id, dlc_package, dlc_image).with_uri(uri))
}

/// Parse the URI of a full or delta payload.
///
/// Parsed images carry no URI of their own. For a delta, the source image is
/// the target build at the source version; its key, channel and version
/// override are not encoded in the name and come back as `None`. Unsigned
/// payload names (no `.signed` extension) are recognised too, with the
/// unsigned image type in the key position.
#[must_use]
pub fn parse_payload_uri(uri: &str) -> Option<Payload> {
    let (build, caps) = split_build(uri, r"payloads/chromeos_([^_/]+)_([^/]+)")?;
    let versions = group(&caps, 5)?;
    let tail = strip_board(group(&caps, 6)?, &build.board)?;

    let tail_caps = captures(
        r"^([^_/]+)_(full|delta)_([^_/]+)\.bin-[0-9A-Fa-f]+(?:\.signed)?$",
        tail,
    )?;
    let image_channel = group(&tail_caps, 1)?.to_string();
    let kind = group(&tail_caps, 2)?;
    let key = group(&tail_caps, 3)?.to_string();

    let (src_version, image_version) = match kind {
        "full" => (None, versions),
        _ => {
            let (src, tgt) = versions.rsplit_once('-')?;
            if src.is_empty() || tgt.is_empty() {
                return None;
            }
            (Some(src), tgt)
        }
    };

    let tgt_image = Image::new(build.clone(), ImageType::default(), Some(key))
        .with_overrides(Some(image_channel), Some(image_version.to_string()));

    let payload = match src_version {
        None => Payload::full(tgt_image),
        Some(src_version) => {
            let src_image = Image::new(build.at_version(src_version), ImageType::default(), None);
            Payload::delta(src_image, tgt_image).ok()?
        }
    };
    Some(payload.with_uri(uri))
}
