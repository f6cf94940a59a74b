//! Fetching the release artifact.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::ProvisionError;

/// Receives `(bytes_downloaded, total_size_option)` while the artifact streams in.
pub type DownloadProgress = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Writes the artifact found at `url` to `dest`.
///
/// Called at most once per provisioning attempt and must not retry on its
/// own; a failure is reported as [`ProvisionError::DownloadFailed`].
pub trait ArtifactFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), ProvisionError>>;
}

/// Downloads over HTTPS with reqwest.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    on_progress: Option<DownloadProgress>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `on_progress` is called after every received chunk.
    pub fn with_progress(on_progress: DownloadProgress) -> Self {
        Self {
            on_progress: Some(on_progress),
        }
    }

    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), ProvisionError> {
        let failed = |reason: String| ProvisionError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("pdf2htmlex-auto/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| failed(e.to_string()))?;

        let describe = |e: reqwest::Error| {
            if e.is_timeout() {
                failed(format!("timed out after {timeout:?}"))
            } else {
                failed(e.to_string())
            }
        };

        let mut response = client.get(url).send().await.map_err(&describe)?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let total = response.content_length();
        debug!("Artifact size: {:?} bytes", total);

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            ProvisionError::SetupError(format!("cannot create '{}': {e}", dest.display()))
        })?;

        let mut downloaded: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(&describe)? {
            file.write_all(&chunk).await.map_err(|e| {
                ProvisionError::SetupError(format!("cannot write '{}': {e}", dest.display()))
            })?;
            downloaded += chunk.len() as u64;
            if let Some(ref cb) = self.on_progress {
                cb(downloaded, total);
            }
        }

        file.flush().await.map_err(|e| {
            ProvisionError::SetupError(format!("cannot flush '{}': {e}", dest.display()))
        })?;

        info!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(())
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), ProvisionError>> {
        self.download(url, dest, timeout).boxed()
    }
}
