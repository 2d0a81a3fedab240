//! Archive unpacking for replacement artifacts.
//!
//! Unpacks `.tar.gz` and `.tar.zst` archives into the destination tree with
//! path traversal protection to prevent zip-slip attacks.

use std::io::Read;
use std::path::{Component, Path};

use crate::config::ArchiveFormat;

/// Trait for unpacking artifact archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveUnpacker {
    /// Unpack the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the relative paths of the files that were written.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::PathTraversal`] if any entry attempts to
    /// escape the destination directory, [`UnpackError::EmptyArchive`] if
    /// no files are found, and [`UnpackError::Io`] on I/O failures.
    fn unpack(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        format: ArchiveFormat,
    ) -> Result<Vec<String>, UnpackError>;
}

/// Errors arising from archive unpacking.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// I/O error during unpacking.
    #[error("unpack I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// Default unpacker using the `tar`, `flate2` and `zstd` crates.
///
/// Validates each entry path before unpacking to guard against path
/// traversal attacks (zip-slip).
pub struct TarUnpacker;

impl ArchiveUnpacker for TarUnpacker {
    fn unpack(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        format: ArchiveFormat,
    ) -> Result<Vec<String>, UnpackError> {
        let file = std::fs::File::open(archive_path)?;
        match format {
            ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(file), dest_dir),
            ArchiveFormat::TarZst => unpack_tar(zstd::Decoder::new(file)?, dest_dir),
        }
    }
}

fn unpack_tar(reader: impl Read, dest_dir: &Path) -> Result<Vec<String>, UnpackError> {
    let mut archive = tar::Archive::new(reader);
    let mut unpacked = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();

        validate_entry_path(&entry_path)?;

        if !entry.unpack_in(dest_dir)? {
            return Err(UnpackError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }

        if !entry.header().entry_type().is_dir() {
            unpacked.push(entry_path.to_string_lossy().into_owned());
        }
    }

    if unpacked.is_empty() {
        return Err(UnpackError::EmptyArchive);
    }

    Ok(unpacked)
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), UnpackError> {
    let escapes = path.is_absolute()
        || path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(UnpackError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
