//! Per-dependency replacement: download → verify → purge → unpack.
//!
//! Runs only after the availability gate has passed for the whole batch.
//! Host-built extension directories for the dependency are removed before
//! the prebuilt archive is unpacked over the destination, so the package
//! never ends up with binaries for two platforms.

use std::fs;
use std::io::Read;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use sha2::{Digest, Sha256};

use super::download::{ArtifactFetcher, DownloadError};
use super::extraction::{ArchiveUnpacker, UnpackError};
use crate::config::{RegistryEndpoint, ResolvedConfig};
use crate::dependency_id::DependencyId;
use crate::discovery::EXTENSIONS_DIR;

/// Errors arising while replacing one dependency.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The archive or its checksum could not be downloaded.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The archive could not be unpacked.
    #[error(transparent)]
    Unpack(#[from] UnpackError),

    /// The downloaded archive does not match its published checksum.
    #[error("checksum mismatch: published={expected}, actual={actual}")]
    ChecksumMismatch {
        /// Digest from the `.sha256` sidecar.
        expected: String,
        /// Digest of the downloaded bytes.
        actual: String,
    },

    /// Preparing the destination failed.
    #[error("could not prepare {path}: {source}")]
    Destination {
        /// The path being created or purged.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Settings passed through to every extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Tree the archive is unpacked into.
    pub destination: Utf8PathBuf,
    /// Build root of the current run.
    pub build_root: Utf8PathBuf,
    /// Cache area of the current run.
    pub cache_area: Utf8PathBuf,
    /// Registry the archive comes from.
    pub registry: RegistryEndpoint,
    /// Verify the `.sha256` sidecar before unpacking.
    pub verify_checksum: bool,
}

impl From<&ResolvedConfig> for ExtractOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            destination: config.paths.destination.clone(),
            build_root: config.paths.build_root.clone(),
            cache_area: config.paths.cache_area.clone(),
            registry: config.registry.clone(),
            verify_checksum: config.verify_checksum,
        }
    }
}

/// What one extraction changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Host-built extension directories removed before unpacking.
    pub purged: Vec<Utf8PathBuf>,
    /// Files written from the archive, relative to the destination.
    pub files: Vec<String>,
}

/// Replaces one dependency. The orchestrator depends on this seam.
#[cfg_attr(test, mockall::automock)]
pub trait Extract: Sync {
    /// Fetch and unpack the replacement for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] when any step fails; the destination may
    /// then be partially modified.
    fn extract(
        &self,
        id: &DependencyId,
        options: &ExtractOptions,
    ) -> Result<ExtractionReport, ExtractionError>;
}

/// Production extractor composed from a fetcher and an unpacker.
pub struct ReplacementExtractor<'a> {
    fetcher: &'a (dyn ArtifactFetcher + Sync),
    unpacker: &'a (dyn ArchiveUnpacker + Sync),
}

impl<'a> ReplacementExtractor<'a> {
    /// Compose an extractor from its collaborators.
    #[must_use]
    pub fn new(
        fetcher: &'a (dyn ArtifactFetcher + Sync),
        unpacker: &'a (dyn ArchiveUnpacker + Sync),
    ) -> Self {
        Self { fetcher, unpacker }
    }
}

impl Extract for ReplacementExtractor<'_> {
    fn extract(
        &self,
        id: &DependencyId,
        options: &ExtractOptions,
    ) -> Result<ExtractionReport, ExtractionError> {
        let temp_dir = tempfile::tempdir().map_err(DownloadError::Io)?;
        let archive_path = temp_dir
            .path()
            .join(format!("{id}.{}", options.registry.format().extension()));

        debug!("downloading replacement for {id}");
        self.fetcher.fetch_archive(id, &archive_path)?;

        if options.verify_checksum {
            let published = self.fetcher.fetch_checksum(id)?;
            verify_checksum(&published, &archive_path)?;
        }

        fs::create_dir_all(&options.destination).map_err(|source| {
            ExtractionError::Destination {
                path: options.destination.clone(),
                source,
            }
        })?;
        let purged = purge_host_builds(&options.destination, id)?;

        let files = self.unpacker.unpack(
            &archive_path,
            options.destination.as_std_path(),
            options.registry.format(),
        )?;
        info!(
            "replaced {id}: purged {} host build(s), unpacked {} file(s)",
            purged.len(),
            files.len()
        );

        Ok(ExtractionReport { purged, files })
    }
}

/// Remove every `extensions/<platform>/<abi>/<id>` directory under
/// `destination`.
///
/// Matches are resolved inside `destination` only; directory symlinks are
/// unlinked rather than followed.
///
/// # Errors
///
/// Returns [`ExtractionError::Destination`] when part of `destination`
/// cannot be searched, a match is not UTF-8, or a matching directory cannot
/// be removed.
pub fn purge_host_builds(
    destination: &Utf8Path,
    id: &DependencyId,
) -> Result<Vec<Utf8PathBuf>, ExtractionError> {
    let pattern = format!(
        "{}/**/{EXTENSIONS_DIR}/*/*/{}",
        glob::Pattern::escape(destination.as_str()),
        glob::Pattern::escape(id.as_str())
    );
    let matches = glob::glob(&pattern).map_err(|e| ExtractionError::Destination {
        path: destination.to_owned(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut purged = Vec::new();
    for entry in matches {
        let path = entry.map_err(|e| ExtractionError::Destination {
            path: lossy_path(e.path()),
            source: e.into_error(),
        })?;
        let path = Utf8PathBuf::from_path_buf(path).map_err(|path| ExtractionError::Destination {
            path: lossy_path(&path),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8"),
        })?;
        if !path.starts_with(destination) {
            continue;
        }
        let removal = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match removal {
            Ok(()) => {
                debug!("purged host build {path}");
                purged.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ExtractionError::Destination { path, source }),
        }
    }
    Ok(purged)
}

fn lossy_path(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from(path.to_string_lossy().into_owned())
}

/// Compare the archive digest with the published sidecar.
///
/// The sidecar may use `sha256sum` format (`<hex>  <filename>`); only the
/// first token is significant and case is ignored.
fn verify_checksum(published: &str, archive_path: &Path) -> Result<(), ExtractionError> {
    let expected = published
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let actual = compute_sha256(archive_path).map_err(DownloadError::Io)?;
    if actual != expected {
        return Err(ExtractionError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Hex-encoded SHA-256 of the file at `path`.
fn compute_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[path = "replacement_tests.rs"]
mod tests;
