//! Artwork resolution for a single player session.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::Url;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{MediaError, remote::ArtworkSource};

/// Suffix of the per-session artwork cache file
const COVER_FILE_SUFFIX: &str = ".mediaplayer-cover";

/// A download every interested party can await; resolves to the cached file
pub type CoverDownload = Shared<BoxFuture<'static, Option<PathBuf>>>;

/// Outcome of resolving an artwork reference
pub enum CoverFetch {
    /// Resolved without touching the network
    Ready(Option<PathBuf>),
    /// A download is running
    Pending(CoverDownload),
}

struct InFlight {
    uri: String,
    download: CoverDownload,
}

/// Resolves artwork references to local files for one session.
///
/// Remote artwork is cached in a single temporary file that lives as long as
/// the fetcher. Requests for the URI already being downloaded join that
/// download instead of starting a new one. A download superseded by a newer
/// request never replaces the cache file.
pub struct CoverArtFetcher {
    source: Arc<dyn ArtworkSource>,
    cache_file: Option<NamedTempFile>,
    in_flight: Option<InFlight>,
    generation: Arc<AtomicU64>,
}

impl CoverArtFetcher {
    /// Create a fetcher downloading through `source`
    pub fn new(source: Arc<dyn ArtworkSource>) -> Self {
        Self {
            source,
            cache_file: None,
            in_flight: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Resolve an artwork reference.
    ///
    /// Local references resolve immediately; `http(s)` references start or
    /// join a download. Anything else resolves to no artwork.
    pub fn fetch(&mut self, reference: Option<&str>) -> CoverFetch {
        let Some(reference) = reference else {
            self.cancel();
            return CoverFetch::Ready(None);
        };

        if !is_remote(reference) {
            self.cancel();
            return CoverFetch::Ready(local_path(reference));
        }

        if let Some(in_flight) = &self.in_flight {
            let failed = matches!(in_flight.download.peek(), Some(None));
            if in_flight.uri == reference && !failed {
                return CoverFetch::Pending(in_flight.download.clone());
            }
        }

        let Some(target) = self.cache_path() else {
            self.cancel();
            return CoverFetch::Ready(None);
        };

        let issued = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let download = download(
            Arc::clone(&self.source),
            reference.to_string(),
            target,
            Arc::clone(&self.generation),
            issued,
        );
        self.in_flight = Some(InFlight {
            uri: reference.to_string(),
            download: download.clone(),
        });
        CoverFetch::Pending(download)
    }

    /// Forget the running download
    ///
    /// Its result is no longer joinable and it will not touch the cache
    /// file; awaiting tasks must be aborted by their owner.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_flight = None;
    }

    fn cache_path(&mut self) -> Option<PathBuf> {
        if self.cache_file.is_none() {
            match tempfile::Builder::new()
                .suffix(COVER_FILE_SUFFIX)
                .tempfile()
            {
                Ok(file) => self.cache_file = Some(file),
                Err(e) => {
                    warn!("Failed to create artwork cache file: {e}");
                    return None;
                }
            }
        }
        self.cache_file.as_ref().map(|file| file.path().to_path_buf())
    }
}

fn download(
    source: Arc<dyn ArtworkSource>,
    uri: String,
    target: PathBuf,
    generation: Arc<AtomicU64>,
    issued: u64,
) -> CoverDownload {
    async move {
        let bytes = match source.read(&uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Artwork unavailable: {e}");
                return None;
            }
        };

        // Stage next to the cache file, then rename over it.
        let dir = target.parent()?.to_path_buf();
        let staged = match tokio::task::spawn_blocking(move || stage(&dir, &bytes)).await {
            Ok(Ok(staged)) => staged,
            Ok(Err(e)) => {
                warn!(%uri, "Failed to cache artwork: {e}");
                return None;
            }
            Err(e) => {
                warn!(%uri, "Artwork caching task failed: {e}");
                return None;
            }
        };

        if generation.load(Ordering::SeqCst) != issued {
            debug!(%uri, "Discarding superseded artwork");
            return None;
        }
        match staged.persist(&target) {
            Ok(_) => Some(target),
            Err(e) => {
                warn!(%uri, "Failed to cache artwork: {e}");
                None
            }
        }
    }
    .boxed()
    .shared()
}

fn stage(dir: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .suffix(COVER_FILE_SUFFIX)
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    Ok(staged)
}

fn is_remote(reference: &str) -> bool {
    Url::parse(reference).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn local_path(reference: &str) -> Option<PathBuf> {
    if reference.starts_with("file:") {
        return Url::parse(reference).ok()?.to_file_path().ok();
    }

    let path = PathBuf::from(reference);
    path.is_absolute().then_some(path)
}

/// Downloads artwork over HTTP(S)
pub struct HttpArtworkSource {
    client: reqwest::Client,
}

impl HttpArtworkSource {
    /// Create a source whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::InitializationFailed(format!("HTTP client failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtworkSource for HttpArtworkSource {
    async fn read(&self, uri: &str) -> Result<Vec<u8>, MediaError> {
        let fetch_error = |e: reqwest::Error| MediaError::ArtworkFetch {
            uri: uri.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_error)?;
        let bytes = response.bytes().await.map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}
