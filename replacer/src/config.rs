//! Run configuration: build paths, registry endpoint and tuning knobs.
//!
//! Values come from an optional TOML file (`.replacer.toml` in the project
//! root, or an explicit `--config` path) and are then overridden by CLI
//! flags. The resolved [`ResolvedConfig`] is passed explicitly into every
//! component; nothing reads configuration from ambient state.

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::{ReplacerError, Result};

/// Configuration file looked up in the project root when no explicit path
/// is given.
pub const DEFAULT_CONFIG_FILE: &str = ".replacer.toml";

/// Registry queried when neither the file nor the CLI names one.
pub const DEFAULT_REGISTRY: &str = "https://lambdagems.com";

const DEFAULT_RUNTIME_VERSION: &str = "2.5.0";
const DEFAULT_TARGET_PLATFORM: &str = "x86_64-linux";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Archive encoding used by the registry for replacement artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball (`.tar.gz`).
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zstandard-compressed tarball (`.tar.zst`).
    #[serde(rename = "tar.zst")]
    TarZst,
}

impl ArchiveFormat {
    /// File extension, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarZst => "tar.zst",
        }
    }
}

/// Root locations for one run. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// Root of the build output.
    pub build_root: Utf8PathBuf,
    /// Cache area holding the installed bundle, `<build_root>/cache` by
    /// default.
    pub cache_area: Utf8PathBuf,
    /// Root of the project whose installed dependencies are tidied.
    pub project_root: Utf8PathBuf,
    /// Where replacement artifacts are unpacked; the cache area by default.
    pub destination: Utf8PathBuf,
}

impl BuildPaths {
    /// Derive the default layout from a build root and a project root.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use native_replacer::config::BuildPaths;
    ///
    /// let paths = BuildPaths::new(Utf8PathBuf::from("/tmp/build"), Utf8PathBuf::from("/app"));
    /// assert_eq!(paths.cache_area, Utf8PathBuf::from("/tmp/build/cache"));
    /// assert_eq!(paths.destination, paths.cache_area);
    /// ```
    #[must_use]
    pub fn new(build_root: Utf8PathBuf, project_root: Utf8PathBuf) -> Self {
        let cache_area = build_root.join("cache");
        Self {
            destination: cache_area.clone(),
            cache_area,
            build_root,
            project_root,
        }
    }
}

/// Registry base URL together with the coordinates used to name artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    base_url: String,
    runtime_version: String,
    target_platform: String,
    format: ArchiveFormat,
}

impl RegistryEndpoint {
    /// Validate and build an endpoint.
    ///
    /// A trailing `/` on the base URL is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::InvalidRegistry`] when the URL is not
    /// `http://` or `https://`, or when a coordinate is blank.
    pub fn new(
        base_url: &str,
        runtime_version: &str,
        target_platform: &str,
        format: ArchiveFormat,
    ) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let host = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"));
        if host.is_none_or(str::is_empty) {
            return Err(ReplacerError::InvalidRegistry {
                value: base_url.to_owned(),
                reason: "expected an http:// or https:// URL".to_owned(),
            });
        }
        for (label, value) in [
            ("runtime version", runtime_version),
            ("target platform", target_platform),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(ReplacerError::InvalidRegistry {
                    value: base_url.to_owned(),
                    reason: format!("{label} \"{value}\" is not a single path segment"),
                });
            }
        }
        Ok(Self {
            base_url: trimmed.to_owned(),
            runtime_version: runtime_version.trim().to_owned(),
            target_platform: target_platform.trim().to_owned(),
            format,
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runtime version directory, e.g. `2.5.0`.
    #[must_use]
    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    /// Platform the replacements were built for, e.g. `x86_64-linux`.
    #[must_use]
    pub fn target_platform(&self) -> &str {
        &self.target_platform
    }

    /// Archive encoding served by this registry.
    #[must_use]
    pub const fn format(&self) -> ArchiveFormat {
        self.format
    }
}

impl fmt::Display for RegistryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Raw contents of a configuration file. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Project root whose bundle is tidied.
    pub project_root: Option<Utf8PathBuf>,
    /// Build root; the cache area lives below it.
    pub build_root: Option<Utf8PathBuf>,
    /// Override for `<build_root>/cache`.
    pub cache_area: Option<Utf8PathBuf>,
    /// Override for the unpack destination.
    pub destination: Option<Utf8PathBuf>,
    /// Registry base URL.
    pub registry: Option<String>,
    /// Runtime version used in artifact URLs.
    pub runtime_version: Option<String>,
    /// Target platform used in artifact URLs.
    pub target_platform: Option<String>,
    /// Archive encoding served by the registry.
    pub archive_format: Option<ArchiveFormat>,
    /// Number of concurrent extractions.
    pub jobs: Option<usize>,
    /// Network timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Whether to verify `.sha256` sidecars.
    pub verify_checksum: Option<bool>,
}

impl FileConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::Config`] on malformed TOML or unknown keys.
    pub fn parse(contents: &str, path: &Utf8Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ReplacerError::Config {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from `path`.
    ///
    /// When `required` is false a missing file yields the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::Config`] when the file cannot be read or
    /// parsed.
    pub fn load(path: &Utf8Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                log::debug!("no configuration file at {path}; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ReplacerError::Config {
                path: path.to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Values supplied on the command line. `None` defers to the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--project-root`.
    pub project_root: Option<Utf8PathBuf>,
    /// `--build-root`.
    pub build_root: Option<Utf8PathBuf>,
    /// `--registry`.
    pub registry: Option<String>,
    /// `--jobs`.
    pub jobs: Option<usize>,
    /// `--timeout`.
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Filesystem roots.
    pub paths: BuildPaths,
    /// Where to query and fetch replacements.
    pub registry: RegistryEndpoint,
    /// Maximum concurrent extractions, at least one.
    pub jobs: usize,
    /// Bound on every network call.
    pub timeout: Duration,
    /// Whether to verify `.sha256` sidecars before unpacking.
    pub verify_checksum: bool,
}

impl ResolvedConfig {
    /// Merge file values and CLI overrides into a resolved configuration.
    ///
    /// Relative paths are resolved against `cwd`. The build root defaults to
    /// `<project_root>/.build`, mirroring where the packager stages its
    /// output.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::InvalidRegistry`] when the registry endpoint
    /// is unusable.
    pub fn resolve(
        file: FileConfig,
        overrides: ConfigOverrides,
        cwd: &Utf8Path,
    ) -> Result<Self> {
        let absolute = |path: Utf8PathBuf| {
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        };

        let project_root = absolute(
            overrides
                .project_root
                .or(file.project_root)
                .unwrap_or_else(|| cwd.to_owned()),
        );
        let build_root = overrides
            .build_root
            .or(file.build_root)
            .map_or_else(|| project_root.join(".build"), absolute);

        let mut paths = BuildPaths::new(build_root, project_root);
        if let Some(cache_area) = file.cache_area {
            paths.cache_area = absolute(cache_area);
            paths.destination.clone_from(&paths.cache_area);
        }
        if let Some(destination) = file.destination {
            paths.destination = absolute(destination);
        }

        let registry_url = overrides
            .registry
            .or(file.registry)
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_owned());
        let registry = RegistryEndpoint::new(
            &registry_url,
            file.runtime_version
                .as_deref()
                .unwrap_or(DEFAULT_RUNTIME_VERSION),
            file.target_platform
                .as_deref()
                .unwrap_or(DEFAULT_TARGET_PLATFORM),
            file.archive_format.unwrap_or_default(),
        )?;

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            paths,
            registry,
            jobs: overrides.jobs.or(file.jobs).unwrap_or(1).max(1),
            timeout: Duration::from_secs(timeout_secs),
            verify_checksum: file.verify_checksum.unwrap_or(false),
        })
    }
}
