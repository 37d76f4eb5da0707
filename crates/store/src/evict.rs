//! Entry scanning and LRU ordering

use paygen_errors::{Error, StorageError};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

#[derive(Debug, Clone)]
pub(crate) struct CachedEntry {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// List regular files in `entries/`. Entries removed mid-scan are skipped.
pub(crate) async fn scan(dir: &Path) -> Result<Vec<CachedEntry>, Error> {
    let mut read_dir = fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, dir))?;
    let mut entries = Vec::new();

    while let Some(item) = read_dir.next_entry().await? {
        let Ok(metadata) = item.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        entries.push(CachedEntry {
            key: item.file_name().to_string_lossy().into_owned(),
            path: item.path(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    Ok(entries)
}

/// Oldest first; ties broken by key so the order is deterministic.
pub(crate) fn sort_lru(entries: &mut [CachedEntry]) {
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
}
