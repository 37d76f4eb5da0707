//! Shared services for payload generation runs

use paygen_config::Config;
use paygen_errors::{ConfigError, Error};
use paygen_events::{EventEmitter, EventSender};
use paygen_net::{NetClient, NetConfig, ObjectStore, UriStorage};
use paygen_platform::{NativeProcessOperations, PlatformContext, ProcessOperations};
use paygen_resources::ResourceManager;
use paygen_store::DownloadCache;
use std::sync::Arc;

/// Everything a run borrows from the process: one per process, shared by
/// every concurrent run.
pub struct GeneratorContext {
    /// Effective configuration
    pub config: Config,
    /// External tool execution
    pub process: Arc<dyn ProcessOperations>,
    /// Uploads and remote existence checks
    pub storage: Arc<dyn ObjectStore>,
    /// Download cache shared with other paygen processes
    pub cache: DownloadCache,
    /// Generator slot limiter
    pub resources: ResourceManager,
    /// Event sender for progress reporting
    pub tx: Option<EventSender>,
}

impl GeneratorContext {
    /// Platform context tagged with `correlation_id`
    #[must_use]
    pub fn platform(&self, correlation_id: &str) -> PlatformContext {
        PlatformContext::new(self.tx.clone()).with_correlation_id(correlation_id)
    }
}

impl EventEmitter for GeneratorContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl std::fmt::Debug for GeneratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorContext")
            .field("config", &self.config)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GeneratorContext`]
///
/// Anything not supplied is built from the configuration.
#[derive(Default)]
pub struct GeneratorContextBuilder {
    config: Option<Config>,
    process: Option<Arc<dyn ProcessOperations>>,
    storage: Option<Arc<dyn ObjectStore>>,
    cache: Option<DownloadCache>,
    resources: Option<ResourceManager>,
    tx: Option<EventSender>,
}

impl GeneratorContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the process backend
    #[must_use]
    pub fn with_process(mut self, process: Arc<dyn ProcessOperations>) -> Self {
        self.process = Some(process);
        self
    }

    /// Set the storage backend
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the download cache
    #[must_use]
    pub fn with_cache(mut self, cache: DownloadCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the resource manager
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceManager) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Build the context
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the network client
    /// cannot be created, or the cache directory cannot be opened.
    pub async fn build(self) -> Result<GeneratorContext, Error> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let process = self
            .process
            .unwrap_or_else(|| Arc::new(NativeProcessOperations::new()));

        let storage = match self.storage {
            Some(storage) => storage,
            None => {
                let client = NetClient::new(NetConfig::from(&config.network))?;
                let storage =
                    UriStorage::new(client, process.clone(), PlatformContext::new(self.tx.clone()))
                        .with_gsutil(config.tools.gsutil.clone())
                        .with_timeout(config.command_timeout());
                Arc::new(storage) as Arc<dyn ObjectStore>
            }
        };

        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                DownloadCache::new(
                    &config.cache_dir(),
                    config.cache.capacity_bytes,
                    storage.clone(),
                    self.tx.clone(),
                )
                .await?
            }
        };

        let resources = self
            .resources
            .unwrap_or_else(|| ResourceManager::new(&config));
        if resources.limits().concurrent_generators == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.concurrent_generators".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        tracing::debug!(
            cache = %config.cache_dir().display(),
            generators = resources.limits().concurrent_generators,
            "generator context ready"
        );

        Ok(GeneratorContext {
            config,
            process,
            storage,
            cache,
            resources,
            tx: self.tx,
        })
    }
}
