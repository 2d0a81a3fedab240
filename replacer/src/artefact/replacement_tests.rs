//! Unit tests for per-dependency replacement.

use super::*;
use crate::artefact::download::MockArtifactFetcher;
use crate::artefact::extraction::MockArchiveUnpacker;
use crate::config::ArchiveFormat;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const HOST_BUILD: &str =
    "bundled/gems/ruby/2.5.0/extensions/x86_64-darwin-16/2.5.0-static/foo-1.0";

struct Workspace {
    _dir: TempDir,
    options: ExtractOptions,
}

impl Workspace {
    fn destination(&self) -> &Utf8Path {
        &self.options.destination
    }

    fn seed_host_build(&self, relative: &str) -> Utf8PathBuf {
        let dir = self.destination().join(relative);
        fs::create_dir_all(&dir).expect("create host build dir");
        fs::write(dir.join("foo.bundle"), b"mach-o").expect("write host build");
        dir
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    let registry = RegistryEndpoint::new(
        "https://gems.example.test",
        "2.5.0",
        "x86_64-linux",
        ArchiveFormat::TarGz,
    )
    .expect("valid registry");
    let options = ExtractOptions {
        destination: root.join(".build/cache"),
        build_root: root.join(".build"),
        cache_area: root.join(".build/cache"),
        registry,
        verify_checksum: false,
    };
    Workspace { _dir: dir, options }
}

fn foo() -> DependencyId {
    DependencyId::parse("foo-1.0").expect("valid identifier")
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn fetcher_writing(bytes: &'static [u8]) -> MockArtifactFetcher {
    let mut fetcher = MockArtifactFetcher::new();
    fetcher
        .expect_fetch_archive()
        .times(1)
        .returning(move |_, dest| {
            fs::write(dest, bytes)?;
            Ok(())
        });
    fetcher
}

#[rstest]
fn extract_purges_host_build_then_unpacks(workspace: Workspace) {
    let host_build = workspace.seed_host_build(HOST_BUILD);
    let fetcher = fetcher_writing(b"archive");
    let mut unpacker = MockArchiveUnpacker::new();
    unpacker
        .expect_unpack()
        .withf(|_, _, format| *format == ArchiveFormat::TarGz)
        .times(1)
        .returning(|_, _, _| Ok(vec!["lib/foo.so".to_owned()]));

    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    let report = extractor
        .extract(&foo(), &workspace.options)
        .expect("extract");

    assert_eq!(report.purged, vec![host_build.clone()]);
    assert_eq!(report.files, vec!["lib/foo.so".to_owned()]);
    assert!(!host_build.exists());
}

#[rstest]
fn extract_accepts_matching_checksum(mut workspace: Workspace) {
    workspace.options.verify_checksum = true;
    let mut fetcher = fetcher_writing(b"archive");
    let published = format!("{}  foo-1.0-x86_64-linux.tar.gz\n", sha256_hex(b"archive"));
    fetcher
        .expect_fetch_checksum()
        .times(1)
        .returning(move |_| Ok(published.to_ascii_uppercase()));
    let mut unpacker = MockArchiveUnpacker::new();
    unpacker
        .expect_unpack()
        .times(1)
        .returning(|_, _, _| Ok(vec!["lib/foo.so".to_owned()]));

    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    assert!(extractor.extract(&foo(), &workspace.options).is_ok());
}

#[rstest]
fn extract_rejects_checksum_mismatch_before_touching_destination(mut workspace: Workspace) {
    workspace.options.verify_checksum = true;
    let host_build = workspace.seed_host_build(HOST_BUILD);
    let mut fetcher = fetcher_writing(b"tampered");
    fetcher
        .expect_fetch_checksum()
        .returning(|_| Ok(sha256_hex(b"archive")));
    let mut unpacker = MockArchiveUnpacker::new();
    unpacker.expect_unpack().never();

    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    let err = extractor
        .extract(&foo(), &workspace.options)
        .expect_err("checksum mismatch");

    assert!(matches!(err, ExtractionError::ChecksumMismatch { .. }));
    assert!(host_build.exists());
}

#[rstest]
fn extract_stops_when_download_fails(workspace: Workspace) {
    let host_build = workspace.seed_host_build(HOST_BUILD);
    let mut fetcher = MockArtifactFetcher::new();
    fetcher.expect_fetch_archive().returning(|_, _| {
        Err(DownloadError::NotFound {
            url: "https://gems.example.test/gems/2.5.0/foo/foo-1.0-x86_64-linux.tar.gz".to_owned(),
        })
    });
    fetcher.expect_fetch_checksum().never();
    let mut unpacker = MockArchiveUnpacker::new();
    unpacker.expect_unpack().never();

    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    let err = extractor
        .extract(&foo(), &workspace.options)
        .expect_err("download failure");

    assert!(matches!(
        err,
        ExtractionError::Download(DownloadError::NotFound { .. })
    ));
    assert!(host_build.exists());
}

#[rstest]
fn extract_surfaces_unpack_errors(workspace: Workspace) {
    let fetcher = fetcher_writing(b"archive");
    let mut unpacker = MockArchiveUnpacker::new();
    unpacker
        .expect_unpack()
        .returning(|_, _, _| Err(UnpackError::EmptyArchive));

    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    let err = extractor
        .extract(&foo(), &workspace.options)
        .expect_err("empty archive");
    assert!(matches!(err, ExtractionError::Unpack(UnpackError::EmptyArchive)));
}

#[rstest]
fn purge_only_matches_the_exact_identifier(workspace: Workspace) {
    let target = workspace.seed_host_build(HOST_BUILD);
    let sibling = workspace.seed_host_build(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-darwin-16/2.5.0-static/foo-1.0.1",
    );
    let other_platform = workspace.seed_host_build(
        "bundled/gems/ruby/2.5.0/extensions/x86_64-linux/2.5.0-static/foo-1.0",
    );

    let mut purged =
        purge_host_builds(workspace.destination(), &foo()).expect("purge host builds");
    purged.sort();

    let mut expected = vec![target.clone(), other_platform.clone()];
    expected.sort();
    assert_eq!(purged, expected);
    assert!(!target.exists());
    assert!(!other_platform.exists());
    assert!(sibling.exists());
}

#[rstest]
fn purge_is_a_no_op_without_host_builds(workspace: Workspace) {
    fs::create_dir_all(workspace.destination()).expect("create destination");
    let purged = purge_host_builds(workspace.destination(), &foo()).expect("purge");
    assert!(purged.is_empty());
}

#[cfg(unix)]
#[rstest]
fn purge_reports_unreadable_directories(workspace: Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let locked = workspace.destination().join("bundled/gems/ruby/2.5.0");
    fs::create_dir_all(&locked).expect("create locked dir");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("lock dir");
    let denied = fs::read_dir(&locked).is_err();

    let result = purge_host_builds(workspace.destination(), &foo());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock dir");
    // Running as root ignores directory permissions.
    if denied {
        match result {
            Err(ExtractionError::Destination { path, .. }) => assert_eq!(path, locked),
            other => panic!("expected Destination error, got {other:?}"),
        }
    }
}

#[test]
fn extract_options_follow_resolved_config() {
    let config = crate::config::ResolvedConfig::resolve(
        crate::config::FileConfig::default(),
        crate::config::ConfigOverrides::default(),
        Utf8Path::new("/work"),
    )
    .expect("resolve defaults");
    let options = ExtractOptions::from(&config);
    assert_eq!(options.destination, config.paths.destination);
    assert_eq!(options.build_root, Utf8PathBuf::from("/work/.build"));
    assert_eq!(options.registry, config.registry);
}
