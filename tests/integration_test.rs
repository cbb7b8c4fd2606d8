// tests/integration_test.rs

//! Integration tests for Prism
//!
//! These tests drive a `PackageIndex` over real archives in a temporary
//! repository root.

use flate2::Compression;
use flate2::write::GzEncoder;
use prism::events::EventOutcome;
use prism::{Config, PackageIndex, Startup};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn pkg_info(name: &str, version: &str) -> String {
    format!(
        "Metadata-Version: 2.1\nName: {}\nVersion: {}\nSummary: test package\n\nLong description.\n",
        name, version
    )
}

/// Write `<name>-<version>.tar.gz` with a PKG-INFO under `<name>-<version>/`
fn write_sdist(root: &Path, name: &str, version: &str) -> PathBuf {
    let path = root.join(format!("{}-{}.tar.gz", name, version));
    let file = File::create(&path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let content = pkg_info(name, version);
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            format!("{}-{}/PKG-INFO", name, version),
            content.as_bytes(),
        )
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
    path
}

fn write_wheel(root: &Path, name: &str, version: &str) -> PathBuf {
    write_wheel_as(root, name, name, version)
}

/// Wheel whose filename spells the project `file_name` while METADATA
/// says `name`
fn write_wheel_as(root: &Path, file_name: &str, name: &str, version: &str) -> PathBuf {
    let path = root.join(format!("{}-{}-py3-none-any.whl", file_name, version));
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file(
        format!("{}-{}.dist-info/METADATA", file_name, version),
        SimpleFileOptions::default(),
    )
    .unwrap();
    zip.write_all(pkg_info(name, version).as_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

fn open_index(root: &Path, write_html: bool) -> PackageIndex {
    let mut config = Config::new(root);
    config.write_html = write_html;
    config.workers = Some(2);
    PackageIndex::open(config).unwrap()
}

fn filenames(index: &PackageIndex, name: &str) -> HashSet<String> {
    index
        .get_leaf(name)
        .unwrap()
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.filename)
        .collect()
}

#[test]
fn test_register_into_empty_repository() {
    let root = TempDir::new().unwrap();
    let path = write_sdist(root.path(), "mypkg", "1.0");
    let index = open_index(root.path(), true);

    let (metadata, md5) = index.register_archive(&path).unwrap().unwrap();
    assert_eq!(metadata.name, "mypkg");
    assert_eq!(metadata.version, "1.0");
    assert_eq!(metadata.filename, "mypkg-1.0.tar.gz");

    let catalog = index.reconciler().catalog().load().unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[&md5].name, "mypkg");

    let records = index.get_leaf("mypkg").unwrap().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].md5, md5);

    let page = fs::read_to_string(root.path().join("mypkg/index.html")).unwrap();
    assert!(page.contains("mypkg-1.0.tar.gz"));
    let home = fs::read_to_string(root.path().join("index.html")).unwrap();
    assert!(home.contains("mypkg"));
}

#[test]
fn test_bulk_reconcile_two_versions() {
    let root = TempDir::new().unwrap();
    write_sdist(root.path(), "mypkg", "1.0");
    write_sdist(root.path(), "mypkg", "2.0");
    let index = open_index(root.path(), true);

    let report = index.reconcile().unwrap();
    assert_eq!(report.new_entries.len(), 2);
    assert_eq!(report.touched_leaves, vec!["mypkg"]);

    let catalog = index.reconciler().catalog().load().unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(
        filenames(&index, "mypkg"),
        HashSet::from(["mypkg-1.0.tar.gz".to_string(), "mypkg-2.0.tar.gz".to_string()])
    );

    let home = fs::read_to_string(root.path().join("index.html")).unwrap();
    assert!(home.contains(r#"href="../mypkg""#));
}

#[test]
fn test_reconcile_converges() {
    let root = TempDir::new().unwrap();
    write_sdist(root.path(), "alpha", "0.1");
    write_sdist(root.path(), "beta", "1.2");
    write_wheel(root.path(), "gamma", "3.0");
    let index = open_index(root.path(), true);

    index.reconcile().unwrap();
    let catalog = fs::read(root.path().join("index.json")).unwrap();
    let leaf = fs::read(root.path().join("alpha/index.json")).unwrap();

    let again = index.reconcile().unwrap();
    assert!(again.new_entries.is_empty());
    assert!(again.touched_leaves.is_empty());
    assert_eq!(fs::read(root.path().join("index.json")).unwrap(), catalog);
    assert_eq!(fs::read(root.path().join("alpha/index.json")).unwrap(), leaf);
    assert_eq!(index.list_packages().unwrap(), vec!["alpha", "beta", "gamma"]);
}

#[test]
fn test_unrecognized_file_is_quarantined() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("notes.rst");
    fs::write(&path, "not an archive").unwrap();
    let index = open_index(root.path(), true);

    assert!(index.register_archive(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(root.path().join("_errors/notes.rst").exists());
    assert!(index.reconciler().catalog().load().unwrap().is_empty());
    assert!(index.list_packages().unwrap().is_empty());
}

#[test]
fn test_corrupt_archive_quarantined_during_reconcile() {
    let root = TempDir::new().unwrap();
    write_sdist(root.path(), "good", "1.0");
    fs::write(root.path().join("broken-1.0.tar.gz"), b"definitely not gzip").unwrap();
    let index = open_index(root.path(), true);

    let report = index.reconcile().unwrap();
    assert_eq!(report.new_entries.len(), 1);
    assert_eq!(report.new_entries[0].metadata.name, "good");
    assert!(root.path().join("_errors/broken-1.0.tar.gz").exists());
    assert_eq!(index.list_packages().unwrap(), vec!["good"]);

    let catalog = index.reconciler().catalog().load().unwrap();
    assert!(catalog.values().all(|m| m.filename != "broken-1.0.tar.gz"));
}

#[test]
fn test_wheel_listed_under_metadata_name() {
    let root = TempDir::new().unwrap();
    let path = write_wheel_as(root.path(), "my_pkg", "my-pkg", "1.0");
    let index = open_index(root.path(), true);

    let (metadata, _) = index.register_archive(&path).unwrap().unwrap();
    assert_eq!(metadata.name, "my-pkg");
    assert_eq!(
        filenames(&index, "my-pkg"),
        HashSet::from(["my_pkg-1.0-py3-none-any.whl".to_string()])
    );

    write_wheel_as(root.path(), "my_pkg", "my-pkg", "2.0");
    let report = index.reconcile().unwrap();
    assert_eq!(report.touched_leaves, vec!["my-pkg"]);
    assert_eq!(filenames(&index, "my-pkg").len(), 2);
    assert_eq!(index.list_packages().unwrap(), vec!["my-pkg"]);
}

#[test]
fn test_path_like_package_name_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("repo");
    fs::create_dir(&repo).unwrap();
    let path = write_wheel_as(&repo, "escaped", "../escaped", "1.0");
    let index = open_index(&repo, true);

    assert!(index.register_archive(&path).unwrap().is_none());
    assert!(repo.join("_errors/escaped-1.0-py3-none-any.whl").exists());
    assert!(!dir.path().join("escaped").exists());
    assert!(index.reconciler().catalog().load().unwrap().is_empty());
}

#[test]
fn test_corrupt_bz2_sdist_is_quarantined() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("mypkg-1.0.tar.bz2");
    fs::write(&path, "this is not bzip2 at all").unwrap();
    let index = open_index(root.path(), true);

    assert!(index.register_archive(&path).unwrap().is_none());
    assert!(root.path().join("_errors/mypkg-1.0.tar.bz2").exists());
    assert!(index.list_packages().unwrap().is_empty());
}

#[test]
fn test_repeated_bad_upload_keeps_earlier_evidence() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken-1.0.tar.gz");
    let index = open_index(root.path(), true);

    for upload in ["first upload", "second upload"] {
        fs::write(&path, upload).unwrap();
        assert!(index.register_archive(&path).unwrap().is_none());
    }

    let mut kept: Vec<String> = fs::read_dir(root.path().join("_errors"))
        .unwrap()
        .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    kept.sort();
    assert_eq!(kept, vec!["first upload", "second upload"]);
}

#[cfg(unix)]
#[test]
fn test_link_farm_deleted_archive() {
    let root = TempDir::new().unwrap();
    write_sdist(root.path(), "mypkg", "1.0");
    write_sdist(root.path(), "mypkg", "2.0");
    let index = open_index(root.path(), false);

    let Startup::Completed(report) = index.startup().unwrap() else {
        panic!("expected a synchronous startup");
    };
    assert_eq!(report.root_written, None);
    assert!(!root.path().join("index.html").exists());

    let leaf_dir = root.path().join("mypkg");
    let before = filenames(&index, "mypkg");
    let untouched = index
        .get_leaf("mypkg")
        .unwrap()
        .unwrap()
        .into_iter()
        .find(|r| r.filename == "mypkg-2.0.tar.gz")
        .unwrap();
    assert_eq!(before.len(), 2);
    assert!(leaf_dir.join("mypkg-1.0.tar.gz").exists());

    fs::remove_file(root.path().join("mypkg-1.0.tar.gz")).unwrap();
    let cleaned = index.cleanup().unwrap();
    assert_eq!(cleaned.len(), 1);
    assert_eq!(cleaned[0].dropped, vec!["mypkg-1.0.tar.gz"]);

    assert!(fs::symlink_metadata(leaf_dir.join("mypkg-1.0.tar.gz")).is_err());
    assert!(leaf_dir.join("mypkg-2.0.tar.gz").exists());
    let records = index.get_leaf("mypkg").unwrap().unwrap();
    assert_eq!(records, vec![untouched]);
}

#[test]
fn test_removal_event_updates_listings() {
    let root = TempDir::new().unwrap();
    let old = write_sdist(root.path(), "mypkg", "1.0");
    write_sdist(root.path(), "mypkg", "2.0");
    let index = open_index(root.path(), true);
    index.reconcile().unwrap();

    fs::remove_file(&old).unwrap();
    let outcome = index.archive_removed(&old).unwrap();
    let EventOutcome::Removed { forgotten, .. } = outcome else {
        panic!("unexpected outcome");
    };
    assert_eq!(forgotten.len(), 1);

    assert_eq!(
        filenames(&index, "mypkg"),
        HashSet::from(["mypkg-2.0.tar.gz".to_string()])
    );
    let page = fs::read_to_string(root.path().join("mypkg/index.html")).unwrap();
    assert!(!page.contains("mypkg-1.0.tar.gz"));
}

#[test]
fn test_concurrent_registration_same_package() {
    let root = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..8)
        .map(|i| write_sdist(root.path(), "mypkg", &format!("1.{}", i)))
        .collect();
    let index = Arc::new(open_index(root.path(), true));

    std::thread::scope(|s| {
        for path in &paths {
            let index = index.clone();
            s.spawn(move || index.register_archive(path).unwrap().unwrap());
        }
    });

    assert_eq!(filenames(&index, "mypkg").len(), 8);
    assert_eq!(index.reconciler().catalog().load().unwrap().len(), 8);
}

#[test]
fn test_subscriber_sees_bulk_update() {
    let root = TempDir::new().unwrap();
    write_sdist(root.path(), "a", "1.0");
    write_wheel(root.path(), "b", "2.0");
    let index = open_index(root.path(), true);

    let touched = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = touched.clone();
    index.events().subscribe(move |_, outcome| {
        if let EventOutcome::BulkUpdated { touched_leaves, .. } = outcome {
            sink.lock().extend(touched_leaves.iter().cloned());
        }
    });

    index.trigger_bulk_update().unwrap();
    assert_eq!(*touched.lock(), vec!["a", "b"]);
}
