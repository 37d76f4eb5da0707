//! Integration tests for the paygen CLI

use std::process::Command;

fn paygen() -> Command {
    Command::new(env!("CARGO_BIN_EXE_paygen"))
}

#[test]
fn test_cli_version() {
    let output = paygen().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("paygen"));
}

#[test]
fn test_cli_help() {
    let output = paygen().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--src-image"));
    assert!(stdout.contains("--private-key"));
    assert!(stdout.contains("--root-pretruncate-path"));
}

#[test]
fn test_output_required_without_extract() {
    let output = paygen().args(["--image", "tgt.bin"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--output"));
}

#[test]
fn test_extract_reports_missing_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = paygen()
        .env("PAYGEN_CACHE_DIR", dir.path().join("cache"))
        .env("PAYGEN_WORK_ROOT", dir.path().join("work"))
        .args([
            "--image",
            &dir.path().join("missing.bin").display().to_string(),
            "--extract",
            "--kern-path",
            &dir.path().join("kern.bin").display().to_string(),
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!dir.path().join("kern.bin").exists());
}
