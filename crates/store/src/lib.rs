#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Download cache for paygen
//!
//! Images are large and many payloads share a source or target, so remote
//! objects are fetched once into a size-bounded local cache and copied out
//! to each run's working directory. Layout under the cache root:
//!
//! - `entries/<blake3(uri)>`: one file per cached object
//! - `tmp/`: in-progress fetches, renamed into `entries/` when complete
//! - `locks/<key>.lock`: advisory locks shared with other paygen processes
//!
//! Entries are evicted least recently used first, using mtime as the clock.

mod evict;
mod lock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use paygen_errors::Error;
use paygen_events::{AppEvent, DownloadEvent, EventEmitter, EventSender};
use paygen_hash::Hash;
use paygen_net::{local_path, uri_type, ObjectStore, UriType};
use paygen_platform::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lock::{EntryLock, LockMode};

type FetchFuture = Shared<BoxFuture<'static, Result<PathBuf, Error>>>;

/// Attempts at reading an entry that another process evicts underneath us.
const MAX_COPY_ATTEMPTS: usize = 3;

/// Shared, size-bounded cache of remote objects.
///
/// Cloning is cheap; clones share in-flight fetches.
#[derive(Clone)]
pub struct DownloadCache {
    inner: Arc<Inner>,
}

struct Inner {
    entries_dir: PathBuf,
    tmp_dir: PathBuf,
    locks_dir: PathBuf,
    capacity: u64,
    storage: Arc<dyn ObjectStore>,
    events: Option<EventSender>,
    in_flight: DashMap<String, FetchFuture>,
}

impl EventEmitter for Inner {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl DownloadCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    ///
    /// Existing entries are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created.
    pub async fn new(
        dir: &Path,
        capacity: u64,
        storage: Arc<dyn ObjectStore>,
        events: Option<EventSender>,
    ) -> Result<Self, Error> {
        let inner = Inner {
            entries_dir: dir.join("entries"),
            tmp_dir: dir.join("tmp"),
            locks_dir: dir.join("locks"),
            capacity,
            storage,
            events,
            in_flight: DashMap::new(),
        };
        fs::create_dir_all(&inner.entries_dir).await?;
        fs::create_dir_all(&inner.tmp_dir).await?;
        fs::create_dir_all(&inner.locks_dir).await?;

        tracing::debug!(root = %dir.display(), capacity, "download cache ready");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Copy the object at `uri` to `dest`.
    ///
    /// Local URIs are copied directly and never cached. Remote objects are
    /// served from the cache, fetching them first on a miss. `dest` is
    /// always a private copy.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (shared by every caller waiting on the same
    /// URI) or an error copying the entry to `dest`.
    pub async fn get_file_copy(&self, uri: &str, dest: &Path) -> Result<(), Error> {
        if uri_type(uri) == UriType::Local {
            fs::copy_file(&local_path(uri), dest).await?;
            return Ok(());
        }

        let key = cache_key(uri);
        for _ in 0..MAX_COPY_ATTEMPTS {
            let entry = self.ensure_entry(uri).await?;

            let _guard = EntryLock::acquire(self.inner.lock_path(&key), LockMode::Shared).await?;
            if fs::exists(&entry).await {
                fs::copy_file(&entry, dest).await?;
                return Ok(());
            }
            tracing::debug!(uri, "cache entry vanished before copy, refetching");
        }

        Err(Error::internal(format!(
            "cache entry for {uri} kept disappearing"
        )))
    }

    /// Make sure `uri` is present in `entries/`, fetching at most once per
    /// process no matter how many tasks ask concurrently.
    async fn ensure_entry(&self, uri: &str) -> Result<PathBuf, Error> {
        let fetch = match self.inner.in_flight.entry(uri.to_string()) {
            Entry::Occupied(existing) if existing.get().peek().is_none() => {
                self.inner.emit(AppEvent::Download(DownloadEvent::Joined {
                    uri: uri.to_string(),
                }));
                existing.get().clone()
            }
            // Settled but not yet removed: never hand out a stale result.
            Entry::Occupied(mut settled) => {
                let fetch = self.start_fetch(uri);
                settled.insert(fetch.clone());
                fetch
            }
            Entry::Vacant(slot) => {
                let fetch = self.start_fetch(uri);
                slot.insert(fetch.clone());
                fetch
            }
        };

        let result = fetch.await;
        // Only settled fetches are dropped so failures are retried next time.
        self.inner
            .in_flight
            .remove_if(uri, |_, pending| pending.peek().is_some());
        result
    }

    fn start_fetch(&self, uri: &str) -> FetchFuture {
        let inner = Arc::clone(&self.inner);
        let owned_uri = uri.to_string();
        async move { inner.fetch_entry(&owned_uri).await }
            .boxed()
            .shared()
    }

    /// Total bytes held in `entries/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries directory cannot be read.
    pub async fn total_size(&self) -> Result<u64, Error> {
        let entries = evict::scan(&self.inner.entries_dir).await?;
        Ok(entries.iter().map(|e| e.size).sum())
    }

    /// Remove every entry not currently locked by a reader or fetcher.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries directory cannot be read or an entry
    /// cannot be removed.
    pub async fn purge(&self) -> Result<usize, Error> {
        let entries = evict::scan(&self.inner.entries_dir).await?;
        let mut removed = 0;
        for entry in entries {
            if self.inner.remove_unlocked(&entry).await? {
                removed += 1;
            }
        }
        tracing::info!(removed, "purged download cache");
        Ok(removed)
    }

    /// Capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.inner.capacity
    }
}

impl Inner {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.entries_dir.join(key)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.locks_dir.join(format!("{key}.lock"))
    }

    async fn fetch_entry(&self, uri: &str) -> Result<PathBuf, Error> {
        let key = cache_key(uri);
        let entry = self.entry_path(&key);

        {
            let _guard = EntryLock::acquire(self.lock_path(&key), LockMode::Exclusive).await?;

            if fs::exists(&entry).await {
                touch(&entry);
                self.emit_cache_hit(uri);
                return Ok(entry);
            }

            self.emit_cache_miss(uri);
            let tmp = self
                .tmp_dir
                .join(format!("{key}.{}", uuid::Uuid::new_v4().simple()));
            if let Err(e) = self.storage.fetch(uri, &tmp).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
            if let Err(e) = fs::atomic_rename(&tmp, &entry).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        }

        self.evict(&key).await?;
        Ok(entry)
    }

    /// Trim `entries/` to capacity, oldest first, never touching `keep`.
    async fn evict(&self, keep: &str) -> Result<(), Error> {
        let mut entries = evict::scan(&self.entries_dir).await?;
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= self.capacity {
            return Ok(());
        }

        evict::sort_lru(&mut entries);
        for entry in entries {
            if total <= self.capacity {
                break;
            }
            if entry.key == keep {
                continue;
            }
            if self.remove_unlocked(&entry).await? {
                total = total.saturating_sub(entry.size);
            }
        }

        if total > self.capacity {
            tracing::warn!(total, capacity = self.capacity, "cache still over capacity");
        }
        Ok(())
    }

    /// Delete `entry` if no other holder has its lock. Returns whether it
    /// was removed.
    async fn remove_unlocked(&self, entry: &evict::CachedEntry) -> Result<bool, Error> {
        let Some(_guard) = EntryLock::try_exclusive(&self.lock_path(&entry.key))? else {
            tracing::debug!(key = %entry.key, "skipping locked cache entry");
            return Ok(false);
        };
        fs::remove_file(&entry.path).await?;
        self.emit_cache_evicted(entry.key.clone(), entry.size);
        Ok(true)
    }
}

fn cache_key(uri: &str) -> String {
    Hash::from_data(uri.as_bytes()).to_hex()
}

/// Bump the LRU clock of an entry.
fn touch(path: &Path) {
    if let Err(e) = filetime::set_file_mtime(path, filetime::FileTime::now()) {
        tracing::debug!(path = %path.display(), error = %e, "failed to touch cache entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OneObject;

    #[async_trait]
    impl ObjectStore for OneObject {
        async fn fetch(&self, _uri: &str, dest: &Path) -> Result<u64, Error> {
            tokio::fs::write(dest, b"fresh").await?;
            Ok(5)
        }

        async fn upload(&self, _src: &Path, _dest_uri: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn exists(&self, _uri: &str) -> Result<bool, Error> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn settled_failure_left_in_flight_is_not_reused() {
        let temp = tempfile::tempdir().unwrap();
        let storage = Arc::new(OneObject);
        let cache = DownloadCache::new(&temp.path().join("cache"), 1 << 20, storage, None)
            .await
            .unwrap();

        let failed: FetchFuture = futures::future::ready(Err(Error::internal("stale failure")))
            .boxed()
            .shared();
        assert!(failed.clone().await.is_err());
        cache
            .inner
            .in_flight
            .insert("gs://b/image.bin".to_string(), failed);

        let dest = temp.path().join("image.bin");
        cache.get_file_copy("gs://b/image.bin", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fresh");
        assert!(cache.inner.in_flight.is_empty());
    }

    #[test]
    fn keys_are_hex_blake3_of_uri() {
        let key = cache_key("gs://chromeos-releases/a.bin");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, cache_key("gs://chromeos-releases/b.bin"));
    }
}
