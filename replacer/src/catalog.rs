//! Availability gate for prebuilt replacements.
//!
//! Before anything in the package is modified, every discovered dependency
//! must have a replacement in the registry. The [`AvailabilityChecker`] asks
//! the [`ArtifactCatalog`] about the whole batch at once and fails with the
//! complete list of missing identifiers, so users can fix all of them in one
//! go.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, info};

use crate::config::RegistryEndpoint;
use crate::dependency_id::DependencyId;
use crate::error::{ReplacerError, Result};

/// Errors raised while querying the registry.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The registry could not be reached or answered unexpectedly.
    #[error("registry query for {url} failed: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// Source of truth for which replacements exist.
///
/// Implementations answer for the whole batch: the returned set holds every
/// identifier from `ids` that has no replacement.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactCatalog {
    /// Return the identifiers from `ids` that the registry cannot supply.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the registry cannot give a definite
    /// answer for some identifier.
    fn missing(
        &self,
        ids: &BTreeSet<DependencyId>,
    ) -> std::result::Result<BTreeSet<DependencyId>, CatalogError>;
}

/// Build the URL of the replacement archive for `id`.
///
/// Layout: `<base>/gems/<runtime>/<name>/<id>-<platform>.<ext>`.
///
/// # Examples
///
/// ```
/// use native_replacer::catalog::artifact_url;
/// use native_replacer::config::{ArchiveFormat, RegistryEndpoint};
/// use native_replacer::dependency_id::DependencyId;
///
/// let registry = RegistryEndpoint::new(
///     "https://lambdagems.com",
///     "2.5.0",
///     "x86_64-linux",
///     ArchiveFormat::TarGz,
/// )?;
/// let id = DependencyId::parse("nokogiri-1.8.1")?;
/// assert_eq!(
///     artifact_url(&registry, &id),
///     "https://lambdagems.com/gems/2.5.0/nokogiri/nokogiri-1.8.1-x86_64-linux.tar.gz"
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[must_use]
pub fn artifact_url(registry: &RegistryEndpoint, id: &DependencyId) -> String {
    format!(
        "{}/gems/{}/{}/{}-{}.{}",
        registry.base_url(),
        registry.runtime_version(),
        id.name(),
        id,
        registry.target_platform(),
        registry.format().extension()
    )
}

/// Registry catalog backed by HTTP `HEAD` requests.
pub struct HttpCatalog {
    registry: RegistryEndpoint,
    agent: ureq::Agent,
}

impl HttpCatalog {
    /// Create a catalog for `registry` with every request bounded by
    /// `timeout`.
    #[must_use]
    pub fn new(registry: RegistryEndpoint, timeout: Duration) -> Self {
        Self {
            registry,
            agent: http_agent(timeout),
        }
    }
}

impl ArtifactCatalog for HttpCatalog {
    fn missing(
        &self,
        ids: &BTreeSet<DependencyId>,
    ) -> std::result::Result<BTreeSet<DependencyId>, CatalogError> {
        let mut missing = BTreeSet::new();
        for id in ids {
            let url = artifact_url(&self.registry, id);
            match self.agent.head(&url).call() {
                Ok(_) => debug!("replacement available: {url}"),
                Err(ureq::Error::StatusCode(404)) => {
                    debug!("replacement missing: {url}");
                    missing.insert(id.clone());
                }
                Err(other) => {
                    return Err(CatalogError::Http {
                        url,
                        reason: other.to_string(),
                    });
                }
            }
        }
        Ok(missing)
    }
}

/// Build a `ureq` agent whose requests are bounded by `timeout`.
pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// The fail-fast gate between discovery and any mutation.
pub struct AvailabilityChecker<'a> {
    catalog: &'a dyn ArtifactCatalog,
    registry: &'a RegistryEndpoint,
}

impl<'a> AvailabilityChecker<'a> {
    /// Create a checker that queries `catalog`, reporting `registry` in
    /// errors.
    #[must_use]
    pub fn new(catalog: &'a dyn ArtifactCatalog, registry: &'a RegistryEndpoint) -> Self {
        Self { catalog, registry }
    }

    /// Confirm that every identifier has a replacement.
    ///
    /// An empty batch passes without contacting the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::MissingArtifacts`] listing every identifier
    /// without a replacement, or [`ReplacerError::Catalog`] when the registry
    /// cannot answer.
    pub fn verify(&self, ids: &BTreeSet<DependencyId>) -> Result<()> {
        if ids.is_empty() {
            debug!("no compiled dependencies; skipping availability check");
            return Ok(());
        }

        info!(
            "checking {} replacement(s) at {}",
            ids.len(),
            self.registry
        );
        let missing: BTreeSet<DependencyId> = self
            .catalog
            .missing(ids)?
            .into_iter()
            .filter(|id| ids.contains(id))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReplacerError::MissingArtifacts {
                missing,
                registry: self.registry.to_string(),
            })
        }
    }
}
