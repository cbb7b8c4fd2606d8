// src/packages/bdist.rs

//! Built distribution metadata readers (eggs and wheels)
//!
//! Both formats are zip files. Eggs keep their metadata in
//! `EGG-INFO/PKG-INFO`, wheels in `{name}-{version}.dist-info/METADATA`.

use crate::error::{Error, Result};
use crate::packages::traits::{PackageInfo, parse_metadata_headers};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Read name and version from an egg
pub fn read_egg(path: &Path) -> Result<PackageInfo> {
    let content = read_zip_member(path, |name| name == "EGG-INFO/PKG-INFO")?;
    parse_metadata_headers(&content)
        .map_err(|e| Error::ExtractionError(format!("{}: {}", path.display(), e)))
}

/// Read name and version from a wheel
pub fn read_wheel(path: &Path) -> Result<PackageInfo> {
    let content = read_zip_member(path, |name| {
        name.strip_suffix("/METADATA")
            .is_some_and(|dir| dir.ends_with(".dist-info") && !dir.contains('/'))
    })?;
    parse_metadata_headers(&content)
        .map_err(|e| Error::ExtractionError(format!("{}: {}", path.display(), e)))
}

/// Read the first member whose name satisfies `wanted`
fn read_zip_member<F>(path: &Path, wanted: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(path)
        .map_err(|e| Error::ExtractionError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::ExtractionError(format!("Invalid zip {}: {}", path.display(), e)))?;

    let member = archive
        .file_names()
        .find(|name| wanted(name))
        .map(str::to_string)
        .ok_or_else(|| {
            Error::ExtractionError(format!("No metadata file in {}", path.display()))
        })?;
    debug!("Reading {} from {}", member, path.display());

    let mut entry = archive
        .by_name(&member)
        .map_err(|e| Error::ExtractionError(format!("Failed to read {}: {}", member, e)))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| Error::ExtractionError(format!("Failed to read {}: {}", member, e)))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_read_wheel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mypkg-1.0-py3-none-any.whl");
        write_zip(
            &path,
            &[
                ("mypkg/__init__.py", ""),
                ("mypkg-1.0.dist-info/WHEEL", "Wheel-Version: 1.0\n"),
                ("mypkg-1.0.dist-info/METADATA", "Metadata-Version: 2.1\nName: mypkg\nVersion: 1.0\n"),
            ],
        );

        let info = read_wheel(&path).unwrap();
        assert_eq!(info, PackageInfo::new("mypkg", "1.0"));
    }

    #[test]
    fn test_read_egg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mypkg-1.0-py2.7.egg");
        write_zip(
            &path,
            &[("EGG-INFO/PKG-INFO", "Name: mypkg\nVersion: 1.0\n")],
        );

        let info = read_egg(&path).unwrap();
        assert_eq!(info.version, "1.0");
    }

    #[test]
    fn test_wheel_without_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mypkg-1.0-py3-none-any.whl");
        write_zip(&path, &[("mypkg/__init__.py", "")]);

        assert!(matches!(read_wheel(&path), Err(Error::ExtractionError(_))));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mypkg-1.0-py2.7.egg");
        std::fs::write(&path, b"plain text").unwrap();

        assert!(matches!(read_egg(&path), Err(Error::ExtractionError(_))));
    }
}
