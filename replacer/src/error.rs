//! Error types for the native dependency replacer.
//!
//! Every variant that aborts a run carries enough context for the user to act
//! on it: the malformed path, every missing identifier, or the dependency
//! whose extraction failed.

use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::artefact::replacement::ExtractionError;
use crate::catalog::CatalogError;
use crate::dependency_id::DependencyId;
use crate::tidy::TidyFailure;

/// Errors that can abort a replacement run.
#[derive(Debug, Error)]
pub enum ReplacerError {
    /// A native artifact sits in a path that does not follow the
    /// `extensions/<platform>/<abi>/<name>-<version>/` layout.
    #[error("malformed artifact path {path}: {reason}")]
    MalformedArtifactPath {
        /// The offending artifact path.
        path: Utf8PathBuf,
        /// Which part of the layout was violated.
        reason: String,
    },

    /// One or more dependencies have no prebuilt replacement.
    #[error("{}", missing_artifacts_message(.missing, .registry))]
    MissingArtifacts {
        /// Every identifier the registry could not supply.
        missing: BTreeSet<DependencyId>,
        /// The registry that was queried.
        registry: String,
    },

    /// The registry could not answer the availability query.
    #[error("availability check failed: {0}")]
    Catalog(#[from] CatalogError),

    /// Fetching or unpacking a replacement failed.
    #[error("replacing {id} failed: {source}")]
    Extraction {
        /// The dependency being replaced.
        id: DependencyId,
        /// The underlying extraction failure.
        #[source]
        source: ExtractionError,
    },

    /// The tidy pass could not remove some paths.
    #[error("{}", tidy_failures_message(.failures))]
    Tidy {
        /// Each path that could not be removed, with its error.
        failures: Vec<TidyFailure>,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration {path}: {reason}")]
    Config {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// The registry endpoint is not a usable URL.
    #[error("invalid registry endpoint \"{value}\": {reason}")]
    InvalidRegistry {
        /// The rejected value.
        value: String,
        /// Description of the problem.
        reason: String,
    },

    /// A path could not be represented as UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

fn missing_artifacts_message(missing: &BTreeSet<DependencyId>, registry: &str) -> String {
    let mut message = format!(
        "{} compiled dependenc{} ha{} no prebuilt replacement at {registry}:",
        missing.len(),
        if missing.len() == 1 { "y" } else { "ies" },
        if missing.len() == 1 { "s" } else { "ve" },
    );
    for id in missing {
        message.push_str("\n  - ");
        message.push_str(id.as_str());
    }
    message.push_str(concat!(
        "\n\nNothing was modified. To continue, either:\n",
        "  * build each dependency on the target runtime, package it as\n",
        "    <name>-<version>-<platform> and publish it to the registry, or\n",
        "  * pin a version of the dependency that ships without native extensions."
    ));
    message
}

fn tidy_failures_message(failures: &[TidyFailure]) -> String {
    let mut message = format!("tidy could not remove {} path(s):", failures.len());
    for failure in failures {
        message.push_str("\n  - ");
        message.push_str(&failure.to_string());
    }
    message
}

/// Result type alias using [`ReplacerError`].
pub type Result<T> = std::result::Result<T, ReplacerError>;
