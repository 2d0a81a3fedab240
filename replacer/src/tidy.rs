//! The tidy pass: shrink extracted dependency trees.
//!
//! Every installed dependency root under the project's bundled tree loses its
//! top-level test suites, docs and caches, then its Markdown/RDoc files and
//! legal or changelog boilerplate at any depth. Directories such as
//! `lib/<name>/cache` or `lib/rack/test` hold runtime code and are kept. Decisions are made by the pure predicates
//! [`is_prunable_dir`] and [`is_prunable_file`], which only ever see names
//! below a dependency root.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, trace, warn};

/// Directory names removed when they sit directly below a dependency root.
pub const PRUNED_DIRS: &[&str] = &[
    "test",
    "tests",
    "spec",
    "features",
    "benchmark",
    "cache",
    "doc",
];

/// File extensions removed below a dependency root.
pub const PRUNED_EXTENSIONS: &[&str] = &["rdoc", "md", "markdown"];

/// Case-sensitive substrings that mark a file name for removal.
pub const PRUNED_NAME_MARKERS: &[&str] = &["LICENSE", "CHANGELOG", "README"];

/// Globs, relative to the project root, that match dependency roots.
const DEPENDENCY_ROOT_PATTERNS: &[&str] = &[
    "bundled/gems/ruby/*/gems/*",
    "bundled/gems/ruby/*/bundler/gems/*",
];

/// Whether a directory with this base name is pruned.
///
/// # Examples
///
/// ```
/// use native_replacer::tidy::is_prunable_dir;
///
/// assert!(is_prunable_dir("spec"));
/// assert!(!is_prunable_dir("lib"));
/// ```
#[must_use]
pub fn is_prunable_dir(name: &str) -> bool {
    PRUNED_DIRS.contains(&name)
}

/// Whether a file with this base name is pruned.
///
/// # Examples
///
/// ```
/// use native_replacer::tidy::is_prunable_file;
///
/// assert!(is_prunable_file("History.md"));
/// assert!(is_prunable_file("MIT-LICENSE"));
/// assert!(!is_prunable_file("foo.rb"));
/// ```
#[must_use]
pub fn is_prunable_file(name: &str) -> bool {
    let pruned_extension = Utf8Path::new(name)
        .extension()
        .is_some_and(|ext| PRUNED_EXTENSIONS.contains(&ext));
    pruned_extension
        || PRUNED_NAME_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
}

/// A path the tidy pass could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidyFailure {
    /// The path that was left behind.
    pub path: Utf8PathBuf,
    /// The I/O error that stopped removal.
    pub message: String,
}

impl fmt::Display for TidyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of a tidy pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidyReport {
    /// Dependency roots visited.
    pub dependencies: usize,
    /// Directories removed recursively.
    pub removed_dirs: usize,
    /// Files (or links) removed.
    pub removed_files: usize,
    /// Paths that could not be removed.
    pub failures: Vec<TidyFailure>,
}

impl TidyReport {
    /// True when nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, path: &Utf8Path, error: &dyn fmt::Display) {
        warn!("tidy failed at {path}: {error}");
        self.failures.push(TidyFailure {
            path: path.to_owned(),
            message: error.to_string(),
        });
    }
}

/// Runs the tidy pass over a project's bundled dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tidier;

impl Tidier {
    /// Create a tidier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Tidy every dependency root under `project_root`.
    ///
    /// Errors never stop the pass; they are collected in the report.
    #[must_use]
    pub fn tidy(&self, project_root: &Utf8Path) -> TidyReport {
        let mut report = TidyReport::default();
        for root in dependency_roots(project_root, &mut report) {
            self.tidy_dependency(&root, &mut report);
        }
        info!(
            "tidy removed {} dir(s) and {} file(s) across {} dependenc{}",
            report.removed_dirs,
            report.removed_files,
            report.dependencies,
            if report.dependencies == 1 { "y" } else { "ies" }
        );
        report
    }

    /// Tidy a single dependency root, adding to `report`.
    pub fn tidy_dependency(&self, root: &Utf8Path, report: &mut TidyReport) {
        debug!("tidying {root}");
        report.dependencies += 1;
        prune_dirs(root, report);
        prune_files(root, report);
    }
}

/// Existing dependency roots under `project_root`, sorted.
///
/// Symlinked roots are skipped. Directories that cannot be searched and
/// non-UTF-8 matches are recorded as failures.
fn dependency_roots(project_root: &Utf8Path, report: &mut TidyReport) -> Vec<Utf8PathBuf> {
    let escaped_root = glob::Pattern::escape(project_root.as_str());
    let mut roots = Vec::new();
    for relative in DEPENDENCY_ROOT_PATTERNS {
        let pattern = format!("{escaped_root}/{relative}");
        let matches = match glob::glob(&pattern) {
            Ok(matches) => matches,
            Err(e) => {
                report.record_failure(project_root, &e);
                continue;
            }
        };
        for entry in matches {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    report.record_failure(&lossy_path(e.path()), e.error());
                    continue;
                }
            };
            let path = match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => path,
                Err(path) => {
                    report.record_failure(&lossy_path(&path), &"path is not valid UTF-8");
                    continue;
                }
            };
            if fs::symlink_metadata(&path).is_ok_and(|meta| meta.file_type().is_dir()) {
                roots.push(path);
            }
        }
    }
    roots.sort();
    roots.dedup();
    roots
}

fn lossy_path(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from(path.to_string_lossy().into_owned())
}

/// Pass 1: remove denylisted directories directly below `root`.
fn prune_dirs(root: &Utf8Path, report: &mut TidyReport) {
    let Some(entries) = list_dir(root, report) else {
        return;
    };
    for (path, file_type) in entries {
        if !file_type.is_dir() || !path.file_name().is_some_and(is_prunable_dir) {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                trace!("removed {path}");
                report.removed_dirs += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => report.record_failure(&path, &e),
        }
    }
}

/// Pass 2: remove denylisted files and links below `root`.
fn prune_files(root: &Utf8Path, report: &mut TidyReport) {
    let mut pending = vec![root.to_owned()];
    while let Some(dir) = pending.pop() {
        let Some(entries) = list_dir(&dir, report) else {
            continue;
        };
        for (path, file_type) in entries {
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            let prunable = path.file_name().is_some_and(is_prunable_file);
            if !prunable {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    trace!("removed {path}");
                    report.removed_files += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => report.record_failure(&path, &e),
            }
        }
    }
}

/// Entries of `dir` with their unfollowed file types.
fn list_dir(dir: &Utf8Path, report: &mut TidyReport) -> Option<Vec<(Utf8PathBuf, fs::FileType)>> {
    let read = match dir.read_dir_utf8() {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            report.record_failure(dir, &e);
            return None;
        }
    };
    let mut entries = Vec::new();
    for entry in read {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.record_failure(dir, &e);
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) => entries.push((entry.path().to_owned(), file_type)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => report.record_failure(entry.path(), &e),
        }
    }
    Some(entries)
}

#[cfg(test)]
#[path = "tidy_tests.rs"]
mod tests;
