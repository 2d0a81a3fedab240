//! Test support utilities for replacer behavioural tests.
//!
//! Provides a throwaway project tree with a build cache and a bundled
//! dependency tree, plus archive builders for realistic replacements.

#![allow(dead_code)]

use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use native_replacer::config::{ConfigOverrides, FileConfig, ResolvedConfig};
use tempfile::TempDir;

/// Ruby ABI segment used for every fixture path.
pub const RUBY_ABI: &str = "2.5.0";

/// A temporary project root with the default `.build/cache` layout.
pub struct TempProject {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl TempProject {
    /// Create an empty project in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 temp dir");
        Self { _dir: dir, root }
    }

    /// The project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Configuration resolved for this project with `jobs` workers.
    pub fn config(&self, jobs: usize) -> ResolvedConfig {
        let overrides = ConfigOverrides {
            project_root: Some(self.root.clone()),
            jobs: Some(jobs),
            ..ConfigOverrides::default()
        };
        ResolvedConfig::resolve(FileConfig::default(), overrides, &self.root)
            .expect("resolve config")
    }

    /// The build cache scanned for native artifacts.
    pub fn cache_area(&self) -> Utf8PathBuf {
        self.root.join(".build/cache")
    }

    /// Place a native artifact for `id` built on `platform` in the cache.
    pub fn add_artifact(&self, platform: &str, id: &str, file: &str) -> Utf8PathBuf {
        let relative = format!(
            "bundled/gems/ruby/{RUBY_ABI}/extensions/{platform}/{RUBY_ABI}-static/{id}/{file}"
        );
        let path = self.cache_area().join(relative);
        write_file(&path, b"\x7fELF");
        path
    }

    /// The installed tree of dependency `id` under the project.
    pub fn gem_root(&self, id: &str) -> Utf8PathBuf {
        self.root
            .join(format!("bundled/gems/ruby/{RUBY_ABI}/gems"))
            .join(id)
    }

    /// Write a file below the installed tree of `id`.
    pub fn add_gem_file(&self, id: &str, relative: &str) -> Utf8PathBuf {
        let path = self.gem_root(id).join(relative);
        write_file(&path, b"content");
        path
    }

    /// Relative paths of every file below `root`, sorted.
    pub fn files_under(&self, root: &Utf8Path) -> Vec<String> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            for entry in dir.read_dir_utf8().expect("read dir") {
                let entry = entry.expect("dir entry");
                if entry.file_type().expect("file type").is_dir() {
                    pending.push(entry.path().to_owned());
                } else {
                    let relative = entry.path().strip_prefix(root).expect("below root");
                    files.push(relative.to_string());
                }
            }
        }
        files.sort();
        files
    }
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Utf8Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

/// A gzip-compressed tarball holding `files`.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *contents)
            .expect("append entry");
    }
    let tar = builder.into_inner().expect("finish tar");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&tar).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
