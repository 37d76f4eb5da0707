use async_trait::async_trait;
use paygen_errors::{Error, StorageError};
use paygen_events::EventEmitter;
use paygen_platform::{fs, run_checked, PlatformCommand, PlatformContext, ProcessOperations};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::client::NetClient;
use crate::uri::{local_path, uri_type, UriType};

/// Byte movement between local files and storage URIs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `uri` to the local file `dest`, returning its size.
    async fn fetch(&self, uri: &str, dest: &Path) -> Result<u64, Error>;

    /// Upload the local file `src` to `dest_uri`.
    async fn upload(&self, src: &Path, dest_uri: &str) -> Result<(), Error>;

    /// Whether an object exists at `uri`.
    async fn exists(&self, uri: &str) -> Result<bool, Error>;
}

/// Scheme-dispatching [`ObjectStore`].
///
/// Local paths are plain file copies, `http(s)` is read-only through
/// [`NetClient`], and `gs://` goes through the `gsutil` tool.
#[derive(Clone)]
pub struct UriStorage {
    client: NetClient,
    process: Arc<dyn ProcessOperations>,
    ctx: PlatformContext,
    gsutil: String,
    timeout: Option<Duration>,
}

impl UriStorage {
    #[must_use]
    pub fn new(client: NetClient, process: Arc<dyn ProcessOperations>, ctx: PlatformContext) -> Self {
        Self {
            client,
            process,
            ctx,
            gsutil: "gsutil".to_string(),
            timeout: None,
        }
    }

    /// Override the `gsutil` executable
    #[must_use]
    pub fn with_gsutil(mut self, gsutil: impl Into<String>) -> Self {
        self.gsutil = gsutil.into();
        self
    }

    /// Time limit for each `gsutil` invocation
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn gsutil_command(&self) -> PlatformCommand {
        let mut cmd = PlatformCommand::new(&self.gsutil);
        cmd.timeout(self.timeout);
        cmd
    }
}

impl std::fmt::Debug for UriStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UriStorage")
            .field("gsutil", &self.gsutil)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for UriStorage {
    async fn fetch(&self, uri: &str, dest: &Path) -> Result<u64, Error> {
        self.ctx.emit_download_started(uri);
        let result = match uri_type(uri) {
            UriType::Local => fs::copy_file(&local_path(uri), dest).await,
            UriType::Http => self.client.download_to(uri, dest).await,
            UriType::GoogleStorage => {
                let mut cmd = self.gsutil_command();
                cmd.arg("cp").arg(uri).arg(dest.display().to_string());
                match run_checked(self.process.as_ref(), &self.ctx, cmd).await {
                    Ok(_) => fs::size(dest).await,
                    Err(e) => Err(e),
                }
            }
        };

        match &result {
            Ok(size) => self.ctx.emit_download_completed(uri, *size),
            Err(e) => self.ctx.emit_download_failed(uri, e),
        }
        result
    }

    async fn upload(&self, src: &Path, dest_uri: &str) -> Result<(), Error> {
        match uri_type(dest_uri) {
            UriType::Local => {
                fs::copy_file(src, &local_path(dest_uri)).await?;
            }
            UriType::Http => {
                return Err(StorageError::UnsupportedScheme {
                    uri: dest_uri.to_string(),
                    operation: "upload".to_string(),
                }
                .into());
            }
            UriType::GoogleStorage => {
                let mut cmd = self.gsutil_command();
                cmd.arg("cp").arg(src.display().to_string()).arg(dest_uri);
                run_checked(self.process.as_ref(), &self.ctx, cmd).await?;
            }
        }

        let size = fs::size(src).await.unwrap_or(0);
        tracing::debug!(src = %src.display(), dest = dest_uri, size, "uploaded");
        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool, Error> {
        match uri_type(uri) {
            UriType::Local => Ok(fs::exists(&local_path(uri)).await),
            UriType::Http => {
                let response = self.client.head(uri).await?;
                Ok(response.status().is_success())
            }
            UriType::GoogleStorage => {
                // `stat` exits nonzero for a missing object.
                let mut cmd = self.gsutil_command();
                cmd.arg("-q").arg("stat").arg(uri);
                let output = self.process.execute_command(&self.ctx, cmd).await?;
                Ok(output.success())
            }
        }
    }
}

/// Copy a local file to a storage URI.
///
/// # Errors
///
/// Returns whatever the store's upload returns.
pub async fn copy(storage: &dyn ObjectStore, src: &Path, dest_uri: &str) -> Result<(), Error> {
    storage.upload(src, dest_uri).await
}
