// src/packages/sdist.rs

//! Source distribution metadata reader
//!
//! Reads `PKG-INFO` from .tar.gz / .tgz / .tar.bz2 tarballs and .zip
//! archives. When an archive carries several `PKG-INFO` files (vendored
//! eggs, test fixtures) the one closest to the archive root wins.

use crate::error::{Error, Result};
use crate::packages::traits::{PackageInfo, parse_metadata_headers};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;
use zip::ZipArchive;

const PKG_INFO: &str = "PKG-INFO";

/// Sdist container format
#[derive(Debug, PartialEq, Eq)]
enum SdistFormat {
    TarGz,
    Zip,
    TarBz2,
}

impl SdistFormat {
    fn detect(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") | Some("tgz") => Ok(SdistFormat::TarGz),
            Some("zip") => Ok(SdistFormat::Zip),
            Some("bz2") => Ok(SdistFormat::TarBz2),
            _ => Err(Error::UnrecognizedFormat(path.display().to_string())),
        }
    }
}

/// Read name and version from a source distribution
pub fn read_sdist(path: &Path) -> Result<PackageInfo> {
    let content = match SdistFormat::detect(path)? {
        SdistFormat::TarGz => read_pkg_info_from_tar(path, GzDecoder::new(open(path)?))?,
        SdistFormat::TarBz2 => read_pkg_info_from_tar(path, BzDecoder::new(open(path)?))?,
        SdistFormat::Zip => read_pkg_info_from_zip(path)?,
    };

    parse_metadata_headers(&content)
        .map_err(|e| Error::ExtractionError(format!("{}: {}", path.display(), e)))
}

fn open(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| Error::ExtractionError(format!("Failed to open {}: {}", path.display(), e)))
}

/// Shallowest `PKG-INFO` in a tarball read through `decoder`
fn read_pkg_info_from_tar<R: Read>(path: &Path, decoder: R) -> Result<String> {
    debug!("Reading tarball {}", path.display());
    let mut archive = Archive::new(decoder);

    let mut best: Option<(usize, String)> = None;
    let entries = archive
        .entries()
        .map_err(|e| Error::ExtractionError(format!("Failed to read tarball: {}", e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| Error::ExtractionError(format!("Failed to read tarball entry: {}", e)))?;

        let depth = {
            let entry_path = entry
                .path()
                .map_err(|e| Error::ExtractionError(format!("Invalid path in tarball: {}", e)))?;
            if entry_path.file_name().and_then(|n| n.to_str()) != Some(PKG_INFO) {
                continue;
            }
            entry_path.components().count()
        };

        if best.as_ref().is_some_and(|(d, _)| *d <= depth) {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| Error::ExtractionError(format!("Failed to read PKG-INFO: {}", e)))?;
        best = Some((depth, content));
    }

    best.map(|(_, content)| content)
        .ok_or_else(|| Error::ExtractionError(format!("No PKG-INFO in {}", path.display())))
}

fn read_pkg_info_from_zip(path: &Path) -> Result<String> {
    let mut archive = ZipArchive::new(open(path)?)
        .map_err(|e| Error::ExtractionError(format!("Invalid zip {}: {}", path.display(), e)))?;

    let best = archive
        .file_names()
        .filter(|name| *name == PKG_INFO || name.ends_with("/PKG-INFO"))
        .min_by_key(|name| name.matches('/').count())
        .map(str::to_string)
        .ok_or_else(|| Error::ExtractionError(format!("No PKG-INFO in {}", path.display())))?;

    let mut entry = archive
        .by_name(&best)
        .map_err(|e| Error::ExtractionError(format!("Failed to read zip entry: {}", e)))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| Error::ExtractionError(format!("Failed to read PKG-INFO: {}", e)))?;
    Ok(content)
}
