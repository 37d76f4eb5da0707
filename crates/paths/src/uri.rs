//! URI builders for the release bucket layout
//!
//! ```text
//! gs://<bucket>/<channel>/<board>/<version>/                 build
//!     chromeos_<...>.bin                                     images
//!     ChromeOS-<type>-<milestone>-<version>-<board>.tar.xz  unsigned archives
//!     dlc/<id>/<package>/dlc.img                            module images
//!     payloads/                                             payloads
//!         signing/                                          signing requests
//!         dlc/<id>/<package>/                               module payloads
//!         LOCK_flag                                         build flags
//! ```

use crate::names::{
    image_name, module_image_name, module_payload_name, payload_name,
    unsigned_image_archive_name, ModuleId,
};
use crate::IMAGE_ARCHIVE_BUCKET;
use paygen_errors::{ConfigError, Error};
use paygen_types::{Build, Image, ImageKind, ImageType, Payload};

/// Marker files stored next to a build's payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFlag {
    Lock,
}

impl BuildFlag {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "LOCK",
        }
    }
}

#[must_use]
pub fn build_uri(build: &Build) -> String {
    format!(
        "gs://{}/{}/{}/{}",
        build.bucket, build.channel, build.board, build.version
    )
}

#[must_use]
pub fn payloads_uri(build: &Build) -> String {
    format!("{}/payloads", build_uri(build))
}

/// Directory where signing requests for the build's payloads are exchanged.
#[must_use]
pub fn signing_uri(build: &Build) -> String {
    format!("{}/signing", payloads_uri(build))
}

#[must_use]
pub fn flag_uri(build: &Build, flag: BuildFlag) -> String {
    format!("{}/{}_flag", payloads_uri(build), flag.as_str())
}

/// URI of a signed image. Channel and version overrides default to the
/// build's own values.
#[must_use]
pub fn image_uri(
    build: &Build,
    key: &str,
    image_type: ImageType,
    image_channel: Option<&str>,
    image_version: Option<&str>,
) -> String {
    let channel = image_channel.unwrap_or(&build.channel);
    let version = image_version.unwrap_or(&build.version);
    format!(
        "{}/{}",
        build_uri(build),
        image_name(channel, &build.board, version, key, image_type)
    )
}

#[must_use]
pub fn unsigned_image_uri(build: &Build, milestone: &str, image_type: ImageType) -> String {
    format!(
        "{}/{}",
        build_uri(build),
        unsigned_image_archive_name(&build.board, &build.version, milestone, image_type)
    )
}

#[must_use]
pub fn module_image_uri(build: &Build, module: ModuleId<'_>) -> String {
    format!(
        "{}/dlc/{}/{}/{}",
        build_uri(build),
        module.dlc_id,
        module.dlc_package,
        module_image_name()
    )
}

/// Glob matching every module image of the build.
#[must_use]
pub fn module_images_uri(build: &Build) -> String {
    format!("{}/dlc/*/*/{}", build_uri(build), module_image_name())
}

#[must_use]
pub fn payload_uri(
    build: &Build,
    random: Option<&str>,
    key: Option<&str>,
    image_channel: Option<&str>,
    image_version: Option<&str>,
    src_version: Option<&str>,
) -> String {
    let channel = image_channel.unwrap_or(&build.channel);
    let version = image_version.unwrap_or(&build.version);
    format!(
        "{}/{}",
        payloads_uri(build),
        payload_name(
            channel,
            &build.board,
            version,
            key,
            random,
            src_version,
            None
        )
    )
}

#[must_use]
pub fn module_payload_uri(
    build: &Build,
    random: Option<&str>,
    module: ModuleId<'_>,
    image_channel: Option<&str>,
    image_version: Option<&str>,
    src_version: Option<&str>,
) -> String {
    let channel = image_channel.unwrap_or(&build.channel);
    let version = image_version.unwrap_or(&build.version);
    format!(
        "{}/dlc/{}/{}/{}",
        payloads_uri(build),
        module.dlc_id,
        module.dlc_package,
        module_payload_name(
            channel,
            &build.board,
            version,
            module,
            random,
            src_version,
            true
        )
    )
}

/// `gs://<bucket>/<board>-release/R<milestone>-<version>`
#[must_use]
pub fn archive_build_uri(
    board: &str,
    milestone: &str,
    version: &str,
    bucket: Option<&str>,
) -> String {
    let bucket = bucket.unwrap_or(IMAGE_ARCHIVE_BUCKET);
    format!("gs://{bucket}/{board}-release/R{milestone}-{version}")
}

fn missing(field: &str) -> Error {
    ConfigError::MissingField {
        field: field.to_string(),
    }
    .into()
}

/// The image's own URI, or its canonical URI derived from its fields.
///
/// # Errors
///
/// Returns `ConfigError::MissingField` when the image has no URI and lacks a
/// build, a key (standard images) or a milestone (archives).
pub fn resolve_image_uri(image: &Image) -> Result<String, Error> {
    if let Some(uri) = &image.uri {
        return Ok(uri.clone());
    }
    image.validate()?;
    let build = image.build.as_ref().ok_or_else(|| missing("image.build"))?;

    match &image.kind {
        ImageKind::Standard => {
            let key = image.key.as_deref().ok_or_else(|| missing("image.key"))?;
            Ok(image_uri(
                build,
                key,
                image.image_type,
                image.image_channel.as_deref(),
                image.image_version.as_deref(),
            ))
        }
        ImageKind::Archive { milestone } => {
            let milestone = milestone
                .as_deref()
                .ok_or_else(|| missing("image.milestone"))?;
            Ok(unsigned_image_uri(build, milestone, image.image_type))
        }
        ImageKind::Module {
            dlc_id,
            dlc_package,
            dlc_image,
        } => Ok(format!(
            "{}/dlc/{dlc_id}/{dlc_package}/{dlc_image}",
            build_uri(build)
        )),
    }
}

/// Canonical destination URI for a payload, drawing a random suffix unless
/// one is given.
///
/// # Errors
///
/// Returns `ConfigError::MissingField` if the payload has no addressable
/// build.
pub fn payload_uri_for(payload: &Payload, random: Option<&str>) -> Result<String, Error> {
    let build = payload
        .owning_build()
        .ok_or_else(|| missing("payload.build"))?;
    build.require_addressable()?;

    let tgt = payload.tgt_image();
    let src_version = payload.src_image().and_then(Image::effective_version);

    match &tgt.kind {
        ImageKind::Module {
            dlc_id,
            dlc_package,
            ..
        } => Ok(module_payload_uri(
            build,
            random,
            ModuleId {
                dlc_id,
                dlc_package,
            },
            tgt.image_channel.as_deref(),
            tgt.image_version.as_deref(),
            src_version,
        )),
        ImageKind::Standard | ImageKind::Archive { .. } => Ok(payload_uri(
            build,
            random,
            tgt.key.as_deref(),
            tgt.image_channel.as_deref(),
            tgt.image_version.as_deref(),
            src_version,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Build {
        Build::release("chromeos-releases", "stable-channel", "x86-alex", "2913.377.0").unwrap()
    }

    #[test]
    fn build_directory_layout() {
        let build = build();
        assert_eq!(
            build_uri(&build),
            "gs://chromeos-releases/stable-channel/x86-alex/2913.377.0"
        );
        assert_eq!(
            signing_uri(&build),
            "gs://chromeos-releases/stable-channel/x86-alex/2913.377.0/payloads/signing"
        );
        assert_eq!(
            flag_uri(&build, BuildFlag::Lock),
            "gs://chromeos-releases/stable-channel/x86-alex/2913.377.0/payloads/LOCK_flag"
        );
    }

    #[test]
    fn image_uri_uses_overrides() {
        let uri = image_uri(
            &build(),
            "mp",
            ImageType::Recovery,
            Some("nplusone-channel"),
            Some("2913.378.0"),
        );
        assert!(uri.ends_with(
            "/2913.377.0/chromeos_2913.378.0_x86-alex_recovery_nplusone-channel_mp.bin"
        ));
    }

    #[test]
    fn archive_uris() {
        assert_eq!(
            archive_build_uri("lumpy", "23", "4.5.6", None),
            "gs://chromeos-image-archive/lumpy-release/R23-4.5.6"
        );
        assert_eq!(
            archive_build_uri("lumpy", "23", "4.5.6", Some("trybot-archive")),
            "gs://trybot-archive/lumpy-release/R23-4.5.6"
        );
        assert_eq!(
            unsigned_image_uri(&build(), "R30", ImageType::Base),
            "gs://chromeos-releases/stable-channel/x86-alex/2913.377.0/ChromeOS-base-R30-2913.377.0-x86-alex.tar.xz"
        );
    }

    #[test]
    fn resolve_prefers_explicit_uri() {
        let image = Image::from_uri("/tmp/chromiumos_image.bin");
        assert_eq!(resolve_image_uri(&image).unwrap(), "/tmp/chromiumos_image.bin");

        let module = Image::module(build(), "sample-dlc", "package", "dlc.img");
        assert_eq!(
            resolve_image_uri(&module).unwrap(),
            module_image_uri(
                &build(),
                ModuleId {
                    dlc_id: "sample-dlc",
                    dlc_package: "package"
                }
            )
        );

        let keyless = Image::new(build(), ImageType::Recovery, None);
        assert!(resolve_image_uri(&keyless).is_err());
    }

    #[test]
    fn payload_uri_for_delta_embeds_source_version() {
        let src = Image::new(build().at_version("2913.331.0"), ImageType::Recovery, Some("mp".into()));
        let tgt = Image::new(build(), ImageType::Recovery, Some("mp".into()));
        let payload = Payload::delta(src, tgt).unwrap();
        let uri = payload_uri_for(&payload, Some("abc123")).unwrap();
        assert_eq!(
            uri,
            "gs://chromeos-releases/stable-channel/x86-alex/2913.377.0/payloads/chromeos_2913.331.0-2913.377.0_x86-alex_stable-channel_delta_mp.bin-abc123.signed"
        );
    }

    #[test]
    fn payload_uri_for_requires_build() {
        let payload = Payload::full(Image::from_uri("/tmp/x.bin"));
        assert!(payload_uri_for(&payload, None).is_err());
    }
}
