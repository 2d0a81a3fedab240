//! Replacement artifact download.
//!
//! Provides a trait-based abstraction for fetching replacement archives and
//! their checksum sidecars from the registry, enabling dependency injection
//! for testing.

use std::path::Path;
use std::time::Duration;

use crate::catalog::{artifact_url, http_agent};
use crate::config::RegistryEndpoint;
use crate::dependency_id::DependencyId;

/// Trait for downloading replacement artifacts.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactFetcher {
    /// Download the replacement archive for `id` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or file write fails.
    fn fetch_archive(&self, id: &DependencyId, dest: &Path) -> Result<(), DownloadError>;

    /// Download the hex SHA-256 sidecar published next to the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the sidecar is missing.
    fn fetch_checksum(&self, id: &DependencyId) -> Result<String, DownloadError>;
}

/// Errors arising from artifact download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested artifact was not found (HTTP 404).
    #[error("artifact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP-based fetcher using `ureq`.
pub struct HttpFetcher {
    registry: RegistryEndpoint,
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher for `registry` with every request bounded by
    /// `timeout`.
    #[must_use]
    pub fn new(registry: RegistryEndpoint, timeout: Duration) -> Self {
        Self {
            registry,
            agent: http_agent(timeout),
        }
    }

    /// Download a URL and return the body as a string.
    fn download_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| DownloadError::HttpError {
                url: url.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Download a URL and write the body to a file.
    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file)
            .map_err(DownloadError::Io)?;
        Ok(())
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch_archive(&self, id: &DependencyId, dest: &Path) -> Result<(), DownloadError> {
        self.download_to_file(&artifact_url(&self.registry, id), dest)
    }

    fn fetch_checksum(&self, id: &DependencyId) -> Result<String, DownloadError> {
        let url = format!("{}.sha256", artifact_url(&self.registry, id));
        self.download_text(&url)
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
