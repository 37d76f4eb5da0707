use serde::{Deserialize, Serialize};

/// Download cache and object transfer events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Entry was already present in the cache
    CacheHit { uri: String },

    /// Entry is missing and will be fetched
    CacheMiss { uri: String },

    /// Another task is already fetching this entry; waiting on it
    Joined { uri: String },

    /// Transfer from the object store started
    Started { uri: String },

    /// Transfer finished and the entry was published
    Completed { uri: String, size: u64 },

    /// Transfer failed
    Failed {
        uri: String,
        error: String,
        retryable: bool,
    },

    /// Entry evicted to keep the cache under capacity
    Evicted { key: String, size: u64 },

    /// Upload of a local file to its destination URI finished
    Uploaded { uri: String, size: u64 },
}
