// src/packages/mod.rs

//! Package archive support for Prism
//!
//! This module classifies archive files by extension and reads their
//! name/version metadata. Each reader implements the
//! `PackageMetadataReader` trait; `MetadataExtractor` wraps a reader with
//! quarantine-on-failure so a single bad archive never aborts a batch.

pub mod bdist;
pub mod extractor;
pub mod sdist;
pub mod traits;

pub use extractor::MetadataExtractor;
pub use traits::{
    ArchiveMetadataReader, FilenameMetadataReader, PackageInfo, PackageMetadataReader,
    check_package_name,
};

use std::fmt;
use std::path::Path;

/// Kind of package archive, decided from the file extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Source distribution (.gz, .bz2, .tgz, .zip)
    Sdist,
    /// Built egg (.egg)
    Bdist,
    /// Wheel (.whl)
    Wheel,
    /// Anything else
    Unrecognized,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &str {
        match self {
            ArchiveKind::Sdist => "sdist",
            ArchiveKind::Bdist => "bdist",
            ArchiveKind::Wheel => "wheel",
            ArchiveKind::Unrecognized => "unrecognized",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ArchiveKind::Unrecognized)
    }

    /// Map a bare extension (without the dot) to a kind
    fn from_extension(ext: &str) -> Self {
        match ext {
            "gz" | "bz2" | "tgz" | "zip" => ArchiveKind::Sdist,
            "egg" => ArchiveKind::Bdist,
            "whl" => ArchiveKind::Wheel,
            _ => ArchiveKind::Unrecognized,
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a path by its final extension
///
/// Only the last `.`-suffix counts, so `pkg-1.0.tar.gz` is matched on
/// `gz`. Matching is exact; `PKG-1.0.ZIP` is unrecognized.
pub fn classify(path: &Path) -> ArchiveKind {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(ArchiveKind::from_extension)
        .unwrap_or(ArchiveKind::Unrecognized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sdists() {
        for name in [
            "mypkg-1.0.tar.gz",
            "mypkg-1.0.tar.bz2",
            "mypkg-1.0.tgz",
            "mypkg-1.0.zip",
        ] {
            assert_eq!(classify(Path::new(name)), ArchiveKind::Sdist, "{}", name);
        }
    }

    #[test]
    fn test_classify_binary_distributions() {
        assert_eq!(
            classify(Path::new("mypkg-1.0-py2.7.egg")),
            ArchiveKind::Bdist
        );
        assert_eq!(
            classify(Path::new("/srv/index/mypkg-1.0-py3-none-any.whl")),
            ArchiveKind::Wheel
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        for name in [
            "README.txt",
            "mypkg-1.0.rpm",
            "mypkg-1.0.tar.xz",
            "mypkg",
            "mypkg-1.0.ZIP",
            ".gz",
        ] {
            let kind = classify(Path::new(name));
            assert_eq!(kind, ArchiveKind::Unrecognized, "{}", name);
            assert!(!kind.is_recognized());
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ArchiveKind::Wheel.to_string(), "wheel");
        assert_eq!(ArchiveKind::Sdist.as_str(), "sdist");
    }
}
