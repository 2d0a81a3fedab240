//! Discovery of compiled dependencies in the build cache.
//!
//! Installing a dependency with native extensions leaves its shared objects
//! under a platform-qualified tree:
//!
//! ```text
//! bundled/gems/ruby/2.5.0/extensions/x86_64-darwin-16/2.5.0-static/nokogiri-1.8.1/nokogiri/nokogiri.bundle
//! bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/pg_ext.so
//! ```
//!
//! The segment two levels below `extensions/` is the dependency identifier.
//! This module finds those artifacts and derives the identifiers by walking
//! path segments; a native artifact that breaks the layout is an error rather
//! than something to skip.

use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace};

use crate::dependency_id::DependencyId;
use crate::error::{ReplacerError, Result};

/// File extensions of compiled native artifacts across host platforms.
pub const NATIVE_EXTENSIONS: &[&str] = &["so", "bundle", "dylib", "dll"];

/// Directory segment that roots the platform-qualified extension tree.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Where an artifact sits inside the extension tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// Host platform triple, e.g. `x86_64-darwin-16`.
    pub platform: String,
    /// ABI tag, e.g. `2.5.0-static`.
    pub abi: String,
    /// The dependency that owns the artifact.
    pub id: DependencyId,
}

/// Extension trees below the cache root, relative to it.
const EXTENSION_ROOT_PATTERN: &str = "bundled/gems/ruby/*/extensions";

/// Find every compiled dependency below `cache_root`.
///
/// A missing cache root means nothing was compiled and yields an empty set.
///
/// # Errors
///
/// Returns [`ReplacerError::MalformedArtifactPath`] when a native artifact
/// under an extension tree does not follow the
/// `<platform>/<abi>/<name>-<version>/` layout, or an I/O error if the tree
/// cannot be read.
pub fn discover(cache_root: &Utf8Path) -> Result<BTreeSet<DependencyId>> {
    let artifacts = native_artifacts(cache_root)?;
    dependency_ids(cache_root, &artifacts)
}

/// Reduce artifact paths to their unique dependency identifiers.
///
/// # Errors
///
/// Returns [`ReplacerError::MalformedArtifactPath`] for the first artifact
/// that breaks the extension tree layout.
pub fn dependency_ids(
    cache_root: &Utf8Path,
    artifacts: &[Utf8PathBuf],
) -> Result<BTreeSet<DependencyId>> {
    let mut ids = BTreeSet::new();
    for artifact in artifacts {
        let location = parse_artifact_path(cache_root, artifact)?;
        debug!(
            "found {} artifact {artifact} for {}",
            location.platform, location.id
        );
        ids.insert(location.id);
    }
    Ok(ids)
}

/// List native artifacts in the extension trees below `cache_root`.
///
/// Only `bundled/gems/ruby/<version>/extensions` is searched; native files a
/// dependency ships inside its own tree are never candidates. Directory
/// symlinks are not followed. The result is sorted, and empty when the cache
/// root does not exist.
///
/// # Errors
///
/// Returns an error if a directory cannot be read or a path is not UTF-8.
pub fn native_artifacts(cache_root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    if !cache_root.is_dir() {
        debug!("cache root {cache_root} does not exist; no compiled dependencies");
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    let mut pending = extension_roots(cache_root)?;

    while let Some(dir) = pending.pop() {
        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path.to_owned());
            } else if has_native_extension(path) {
                trace!("native artifact candidate {path}");
                artifacts.push(path.to_owned());
            }
        }
    }

    artifacts.sort();
    Ok(artifacts)
}

/// Existing `extensions` directories under `cache_root`.
fn extension_roots(cache_root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let pattern = format!(
        "{}/{EXTENSION_ROOT_PATTERN}",
        glob::Pattern::escape(cache_root.as_str())
    );
    let matches =
        glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut roots = Vec::new();
    for entry in matches {
        let path = entry.map_err(glob::GlobError::into_error)?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|path| ReplacerError::NonUtf8Path(path.display().to_string()))?;
        if fs::symlink_metadata(&path).is_ok_and(|meta| meta.file_type().is_dir()) {
            roots.push(path);
        }
    }
    Ok(roots)
}

/// Returns true when the file extension marks a compiled artifact.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use native_replacer::discovery::has_native_extension;
///
/// assert!(has_native_extension(Utf8Path::new("pg_ext.so")));
/// assert!(has_native_extension(Utf8Path::new("nokogiri.bundle")));
/// assert!(!has_native_extension(Utf8Path::new("nokogiri.rb")));
/// ```
#[must_use]
pub fn has_native_extension(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| NATIVE_EXTENSIONS.contains(&ext))
}

fn relative_segments<'a>(cache_root: &Utf8Path, path: &'a Utf8Path) -> Vec<&'a str> {
    path.strip_prefix(cache_root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_str())
        .collect()
}

/// Derive the dependency identifier for one artifact path.
///
/// # Errors
///
/// Returns [`ReplacerError::MalformedArtifactPath`] when the path does not
/// follow the extension tree layout.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use native_replacer::discovery::dependency_id_from_path;
///
/// let id = dependency_id_from_path(
///     Utf8Path::new("/build/cache"),
///     Utf8Path::new(
///         "/build/cache/bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0-static/byebug-9.1.0/byebug/byebug.so",
///     ),
/// )?;
/// assert_eq!(id.as_str(), "byebug-9.1.0");
/// # Ok::<(), native_replacer::error::ReplacerError>(())
/// ```
pub fn dependency_id_from_path(cache_root: &Utf8Path, artifact: &Utf8Path) -> Result<DependencyId> {
    parse_artifact_path(cache_root, artifact).map(|location| location.id)
}

/// Split an artifact path into platform, ABI tag and dependency identifier.
///
/// Segments are taken relative to `cache_root` so that directory names above
/// the cache never influence the result. The first `extensions` segment
/// directly below `gems/ruby/<version>` anchors the layout.
///
/// # Errors
///
/// Returns [`ReplacerError::MalformedArtifactPath`] when the anchor is
/// missing, when fewer than three directories follow it before the file, or
/// when the identifier segment has no `<name>-<version>` shape.
pub fn parse_artifact_path(cache_root: &Utf8Path, artifact: &Utf8Path) -> Result<ArtifactLocation> {
    let malformed = |reason: String| ReplacerError::MalformedArtifactPath {
        path: artifact.to_owned(),
        reason,
    };

    let segments = relative_segments(cache_root, artifact);
    let anchor = segments
        .windows(4)
        .position(|window| matches!(window, ["gems", "ruby", _, EXTENSIONS_DIR]))
        .map(|start| start + 3)
        .ok_or_else(|| {
            malformed(format!(
                "no `gems/ruby/<version>/{EXTENSIONS_DIR}` directory in path"
            ))
        })?;

    let tail = segments.get(anchor + 1..).unwrap_or_default();
    let [platform, abi, id_segment, _file, ..] = tail else {
        return Err(malformed(format!(
            "expected {EXTENSIONS_DIR}/<platform>/<abi>/<name>-<version>/<file>, found {} segment(s) after `{EXTENSIONS_DIR}`",
            tail.len()
        )));
    };

    let id = DependencyId::parse(id_segment).map_err(|e| malformed(e.to_string()))?;

    Ok(ArtifactLocation {
        platform: (*platform).to_owned(),
        abi: (*abi).to_owned(),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    const ROOT: &str = "/build/cache";

    fn touch(root: &Utf8Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("create parent dirs");
        std::fs::write(&path, b"\x7fELF").expect("write artifact");
    }

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("non-UTF8 path");
        (temp, root)
    }

    #[rstest]
    #[case::darwin_static(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-darwin-16/2.5.0-static/nokogiri-1.8.1/nokogiri/nokogiri.bundle",
        "x86_64-darwin-16",
        "2.5.0-static",
        "nokogiri-1.8.1"
    )]
    #[case::lambda_linux(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0-static/byebug-9.1.0/byebug/byebug.so",
        "x86_64-linux",
        "2.5.0-static",
        "byebug-9.1.0"
    )]
    #[case::ubuntu_linux(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/pg_ext.so",
        "x86_64-linux",
        "2.5.0",
        "pg-0.21.0"
    )]
    #[case::hyphenated_name(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/google-protobuf-3.5.1.1/google/protobuf_c.so",
        "x86_64-linux",
        "2.5.0",
        "google-protobuf-3.5.1.1"
    )]
    #[case::platform_version(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/nokogiri-1.10.0-x86_64-linux/nokogiri.so",
        "x86_64-linux",
        "2.5.0",
        "nokogiri-1.10.0-x86_64-linux"
    )]
    fn parse_artifact_path_extracts_identifier(
        #[case] relative: &str,
        #[case] platform: &str,
        #[case] abi: &str,
        #[case] id: &str,
    ) {
        let root = Utf8Path::new(ROOT);
        let location =
            parse_artifact_path(root, &root.join(relative)).expect("valid artifact path");
        assert_eq!(location.platform, platform);
        assert_eq!(location.abi, abi);
        assert_eq!(location.id.as_str(), id);
    }

    #[rstest]
    #[case::no_anchor("bundled/gems/ruby/2.5.0/gems/pg-0.21.0/lib/pg_ext.so", "no `gems/ruby/<version>/extensions`")]
    #[case::anchor_inside_dependency(
        "bundled/gems/ruby/2.5.0/gems/foo-1.0/lib/foo/extensions/bar.so",
        "no `gems/ruby/<version>/extensions`"
    )]
    #[case::missing_abi("bundled/gems/ruby/2.5.0/extensions/x86_64-linux/pg_ext.so", "found 2 segment(s)")]
    #[case::file_in_abi_dir(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg_ext.so",
        "found 3 segment(s)"
    )]
    #[case::unversioned_dir(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg/pg_ext.so",
        "<name>-<version>"
    )]
    fn parse_artifact_path_rejects_malformed_layouts(#[case] relative: &str, #[case] reason: &str) {
        let root = Utf8Path::new(ROOT);
        let err = parse_artifact_path(root, &root.join(relative)).expect_err("malformed path");
        assert!(
            matches!(&err, ReplacerError::MalformedArtifactPath { reason: r, .. } if r.contains(reason)),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn segments_above_cache_root_are_ignored() {
        let root = Utf8Path::new("/srv/extensions/a/b/c-1.0/cache");
        let artifact = root.join("bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/pg_ext.so");
        let id = dependency_id_from_path(root, &artifact).expect("valid artifact path");
        assert_eq!(id.as_str(), "pg-0.21.0");
    }

    #[test]
    fn discover_missing_root_returns_empty() {
        let ids = discover(Utf8Path::new("/nonexistent/cache")).expect("scan should succeed");
        assert!(ids.is_empty());
    }

    #[test]
    fn discover_deduplicates_multiple_artifacts() {
        let (_temp, root) = temp_root();
        let base = "bundled/gems/ruby/2.5.0/extensions";
        touch(&root, &format!("{base}/x86_64-linux/2.5.0-static/nokogiri-1.8.1/nokogiri/nokogiri.so"));
        touch(&root, &format!("{base}/x86_64-linux/2.5.0-static/nokogiri-1.8.1/nokogiri/xslt.so"));
        touch(&root, &format!("{base}/x86_64-darwin-16/2.5.0-static/nokogiri-1.8.1/nokogiri.bundle"));
        touch(&root, &format!("{base}/x86_64-linux/2.5.0-static/byebug-9.1.0/byebug/byebug.so"));

        let ids = discover(&root).expect("scan should succeed");
        let names: Vec<&str> = ids.iter().map(DependencyId::as_str).collect();
        assert_eq!(names, vec!["byebug-9.1.0", "nokogiri-1.8.1"]);
    }

    #[test]
    fn discover_ignores_native_files_outside_extension_tree() {
        let (_temp, root) = temp_root();
        touch(&root, "bundled/gems/ruby/2.5.0/gems/pg-0.21.0/lib/pg_ext.so");
        touch(
            &root,
            "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/gem.build_complete",
        );

        let ids = discover(&root).expect("scan should succeed");
        assert!(ids.is_empty());
    }

    #[test]
    fn discover_ignores_extensions_dirs_shipped_inside_dependencies() {
        let (_temp, root) = temp_root();
        touch(&root, "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/pg_ext.so");
        touch(&root, "bundled/gems/ruby/2.5.0/gems/foo-1.0/lib/foo/extensions/bar.so");

        let ids = discover(&root).expect("scan should succeed");
        let names: Vec<&str> = ids.iter().map(DependencyId::as_str).collect();
        assert_eq!(names, vec!["pg-0.21.0"]);
    }

    #[test]
    fn native_artifacts_are_listed_from_every_ruby_version() {
        let (_temp, root) = temp_root();
        touch(&root, "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0/pg-0.21.0/pg_ext.so");
        touch(&root, "bundled/gems/ruby/2.7.0/extensions/x86_64-linux/2.7.0/pg-1.2.3/pg_ext.so");

        let artifacts = native_artifacts(&root).expect("scan should succeed");
        assert_eq!(artifacts.len(), 2);
        let ids = dependency_ids(&root, &artifacts).expect("valid layout");
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn discover_fails_on_malformed_tree() {
        let (_temp, root) = temp_root();
        touch(&root, "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/pg_ext.so");

        let err = discover(&root).expect_err("malformed tree");
        assert!(matches!(err, ReplacerError::MalformedArtifactPath { .. }));
    }

    #[rstest]
    #[case::so("ext.so", true)]
    #[case::bundle("ext.bundle", true)]
    #[case::dylib("libext.dylib", true)]
    #[case::dll("ext.dll", true)]
    #[case::ruby("ext.rb", false)]
    #[case::object("ext.o", false)]
    #[case::versioned_so("libext.so.1", false)]
    fn native_extension_detection(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(has_native_extension(Utf8Path::new(name)), expected);
    }
}
