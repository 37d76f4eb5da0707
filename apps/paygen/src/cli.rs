//! Command line interface definition

use clap::Parser;
use std::path::PathBuf;

/// paygen - generate ChromeOS update payloads
#[derive(Parser, Debug)]
#[command(name = "paygen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate, sign and verify ChromeOS update payloads")]
#[command(long_about = None)]
pub struct Cli {
    /// Target image URI or path
    #[arg(long, value_name = "URI")]
    pub image: String,

    /// Source image URI or path; generates a delta payload
    #[arg(long, value_name = "URI")]
    pub src_image: Option<String>,

    /// Where to publish the payload
    #[arg(long, value_name = "URI", required_unless_present = "extract")]
    pub output: Option<String>,

    /// Sign the payload with this private key
    #[arg(long, value_name = "PATH")]
    pub private_key: Option<PathBuf>,

    /// Apply the generated payload and verify the result
    #[arg(long)]
    pub check: bool,

    /// Copy the metadata hash to this file
    #[arg(long, value_name = "PATH")]
    pub out_metadata_hash_file: Option<PathBuf>,

    /// Keep intermediate files in this directory
    #[arg(long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    #[command(flatten)]
    pub extract: ExtractArgs,

    /// Use alternate config file
    #[arg(long, value_name = "PATH", env = "PAYGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log as JSON lines and print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Partition extraction without generating a payload
#[derive(clap::Args, Debug, Default)]
pub struct ExtractArgs {
    /// Only extract the requested partitions, then exit
    #[arg(long)]
    pub extract: bool,

    /// Kernel partition of the target image
    #[arg(long, value_name = "PATH", requires = "extract")]
    pub kern_path: Option<PathBuf>,

    /// Root filesystem of the target image, truncated to its filesystem size
    #[arg(long, value_name = "PATH", requires = "extract")]
    pub root_path: Option<PathBuf>,

    /// Whole root partition of the target image
    #[arg(long, value_name = "PATH", requires = "extract")]
    pub root_pretruncate_path: Option<PathBuf>,

    /// Kernel partition of the source image
    #[arg(long, value_name = "PATH", requires_all = ["extract", "src_image"])]
    pub src_kern_path: Option<PathBuf>,

    /// Root filesystem of the source image
    #[arg(long, value_name = "PATH", requires_all = ["extract", "src_image"])]
    pub src_root_path: Option<PathBuf>,
}

impl ExtractArgs {
    /// Whether any extraction target was named.
    pub fn any(&self) -> bool {
        self.kern_path.is_some()
            || self.root_path.is_some()
            || self.root_pretruncate_path.is_some()
            || self.src_kern_path.is_some()
            || self.src_root_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_required_unless_extracting() {
        assert!(Cli::try_parse_from(["paygen", "--image", "tgt.bin"]).is_err());

        let cli = Cli::try_parse_from([
            "paygen",
            "--image",
            "tgt.bin",
            "--extract",
            "--kern-path",
            "kern.bin",
        ])
        .unwrap();
        assert!(cli.extract.extract);
        assert!(cli.extract.any());
        assert!(cli.output.is_none());
    }

    #[test]
    fn source_partitions_need_a_source_image() {
        let parsed = Cli::try_parse_from([
            "paygen",
            "--image",
            "tgt.bin",
            "--extract",
            "--src-root-path",
            "root.bin",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn full_generation_flags() {
        let cli = Cli::try_parse_from([
            "paygen",
            "--image",
            "gs://bucket/tgt.bin",
            "--src-image",
            "gs://bucket/src.bin",
            "--output",
            "gs://bucket/delta.bin",
            "--private-key",
            "/keys/update_key.pem",
            "--check",
        ])
        .unwrap();
        assert_eq!(cli.src_image.as_deref(), Some("gs://bucket/src.bin"));
        assert!(cli.check);
        assert!(!cli.extract.extract);
        assert!(!cli.extract.any());
    }
}
