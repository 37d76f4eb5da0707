//! Filesystem convenience helpers.
//!
//! Thin wrappers over `tokio::fs` that attach the offending path to errors.

use paygen_errors::{Error, StorageError};
use std::path::Path;
use tokio::fs;

/// Result type for filesystem operations
pub type Result<T> = std::result::Result<T, Error>;

fn with_path(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |e| StorageError::from_io_with_path(&e, path).into()
}

/// Rename `src` over `dst`. Both must be on the same filesystem.
///
/// # Errors
///
/// Returns `StorageError::AtomicRenameFailed` if the rename fails.
pub async fn atomic_rename(src: &Path, dst: &Path) -> Result<()> {
    fs::rename(src, dst).await.map_err(|e| {
        StorageError::AtomicRenameFailed {
            message: format!("{} -> {}: {e}", src.display(), dst.display()),
        }
        .into()
    })
}

/// Create a directory and all missing parents
///
/// # Errors
///
/// Returns an error if any directory cannot be created.
pub async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(with_path(path))
}

/// Remove a directory and all its contents
///
/// # Errors
///
/// Returns an error if the removal fails.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).await.map_err(with_path(path))
}

/// Remove a single file; a missing file is not an error
///
/// # Errors
///
/// Returns an error if the file exists and cannot be removed.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(with_path(path)(e)),
    }
}

/// Check if a path exists
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Size of a regular file in bytes
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub async fn size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).await.map_err(with_path(path))?.len())
}

/// Copy a file, creating the destination's parent directories
///
/// # Errors
///
/// Returns an error if the parent cannot be created or the copy fails.
pub async fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).await?;
    }
    fs::copy(src, dst).await.map_err(with_path(src))
}

/// Ensure a directory exists and is empty
///
/// # Errors
///
/// Returns an error if removal or creation fails.
pub async fn ensure_empty_dir(path: &Path) -> Result<()> {
    if exists(path).await {
        remove_dir_all(path).await?;
    }
    create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let dst = dir.path().join("a/b/c/dst.bin");
        let copied = copy_file(&src, &dst).await.unwrap();
        assert_eq!(copied, 7);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_file(&dir.path().join("absent")).await.unwrap();
    }

    #[tokio::test]
    async fn size_of_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = size(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::PathNotFound { .. })
        ));
    }
}
