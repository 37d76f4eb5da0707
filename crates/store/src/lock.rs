//! Cross-process advisory locks on cache entries

use fs2::FileExt;
use paygen_errors::{Error, StorageError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    /// Held while reading an entry out of the cache
    Shared,
    /// Held while fetching or evicting an entry
    Exclusive,
}

/// An open lock file. The lock is released when this is dropped.
#[derive(Debug)]
pub(crate) struct EntryLock {
    _file: File,
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

fn lock_failed(path: &Path) -> Error {
    StorageError::LockFailed {
        path: path.display().to_string(),
    }
    .into()
}

impl EntryLock {
    /// Block (off the async runtime) until the lock is granted.
    pub(crate) async fn acquire(path: PathBuf, mode: LockMode) -> Result<Self, Error> {
        let display = path.clone();
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            match mode {
                LockMode::Shared => FileExt::lock_shared(&file)?,
                LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
            }
            Ok::<_, std::io::Error>(Self { _file: file })
        })
        .await
        .map_err(|e| Error::internal(format!("lock task failed: {e}")))?
        .map_err(|_| lock_failed(&display))
    }

    /// Take an exclusive lock only if nobody else holds one.
    pub(crate) fn try_exclusive(path: &Path) -> Result<Option<Self>, Error> {
        let file = open_lock_file(path).map_err(|_| lock_failed(path))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(_) => Ok(None),
        }
    }
}
