// src/packages/traits.rs

//! Common traits for package metadata readers

use crate::error::{Error, Result};
use crate::packages::{ArchiveKind, bdist, sdist};
use std::path::Path;
use tracing::debug;

/// Name and version read from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Capability to read {name, version} out of a classified archive
///
/// Implementations must fail with `Error::ExtractionError` (or
/// `Error::UnrecognizedFormat`) instead of panicking; callers quarantine
/// the archive on any error.
pub trait PackageMetadataReader: Send + Sync {
    fn read_metadata(&self, path: &Path, kind: ArchiveKind) -> Result<PackageInfo>;
}

/// Default reader dispatching on the archive kind
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveMetadataReader;

impl PackageMetadataReader for ArchiveMetadataReader {
    fn read_metadata(&self, path: &Path, kind: ArchiveKind) -> Result<PackageInfo> {
        debug!("Reading {} metadata from {}", kind, path.display());

        match kind {
            ArchiveKind::Sdist => sdist::read_sdist(path),
            ArchiveKind::Bdist => bdist::read_egg(path),
            ArchiveKind::Wheel => bdist::read_wheel(path),
            ArchiveKind::Unrecognized => {
                Err(Error::UnrecognizedFormat(path.display().to_string()))
            }
        }
    }
}

/// Reader that trusts the archive filename and never opens the file
///
/// Sdists are split at the last `-` (`{name}-{version}.tar.gz`); eggs and
/// wheels at the first two `-` (`{name}-{version}-{tags}.whl`).
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameMetadataReader;

impl PackageMetadataReader for FilenameMetadataReader {
    fn read_metadata(&self, path: &Path, kind: ArchiveKind) -> Result<PackageInfo> {
        if !kind.is_recognized() {
            return Err(Error::UnrecognizedFormat(path.display().to_string()));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
        info_from_filename(filename, kind)
    }
}

const SDIST_SUFFIXES: &[&str] = &[".tar.gz", ".tar.bz2", ".tgz", ".zip", ".gz", ".bz2"];

/// Derive name and version from an archive filename
pub(crate) fn info_from_filename(filename: &str, kind: ArchiveKind) -> Result<PackageInfo> {
    let unparseable =
        || Error::ExtractionError(format!("Cannot parse name and version from {}", filename));

    let (name, version) = match kind {
        ArchiveKind::Sdist => {
            let base = SDIST_SUFFIXES
                .iter()
                .find_map(|suffix| filename.strip_suffix(suffix))
                .ok_or_else(unparseable)?;
            base.rsplit_once('-').ok_or_else(unparseable)?
        }
        ArchiveKind::Bdist | ArchiveKind::Wheel => {
            let mut parts = filename.splitn(3, '-');
            let name = parts.next().ok_or_else(unparseable)?;
            let version = parts
                .next()
                .map(|v| v.trim_end_matches(".egg").trim_end_matches(".whl"))
                .ok_or_else(unparseable)?;
            (name, version)
        }
        ArchiveKind::Unrecognized => return Err(Error::UnrecognizedFormat(filename.to_string())),
    };

    if name.is_empty() || version.is_empty() {
        return Err(unparseable());
    }
    Ok(PackageInfo::new(name, version))
}

/// Reject package names that cannot be used as a leaf directory
///
/// A leaf lives at `<root>/<name>`, so the name must be a single path
/// component: not empty, not `.` or `..`, and free of separators.
pub fn check_package_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if bad {
        return Err(Error::ExtractionError(format!(
            "Package name {:?} is not a valid leaf name",
            name
        )));
    }
    Ok(())
}

/// Parse `Name:` and `Version:` out of an RFC 822 style metadata file
///
/// Only the header block is considered; the long description after the
/// first blank line may contain anything.
pub(crate) fn parse_metadata_headers(content: &str) -> Result<PackageInfo> {
    let mut name = None;
    let mut version = None;

    for line in content.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        }
    }

    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::ExtractionError("Missing Name in metadata".to_string()))?;
    let version = version
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::ExtractionError("Missing Version in metadata".to_string()))?;

    Ok(PackageInfo { name, version })
}
