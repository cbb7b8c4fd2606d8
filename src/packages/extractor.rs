// src/packages/extractor.rs

//! Classify, read, and quarantine on failure

use crate::error::Error;
use crate::packages::{
    ArchiveKind, PackageInfo, PackageMetadataReader, check_package_name, classify,
};
use crate::quarantine::Quarantine;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Metadata extraction with a quarantine fallback
///
/// `extract` never fails: unrecognized or unreadable archives are moved to
/// the quarantine folder and reported as `None`.
#[derive(Clone)]
pub struct MetadataExtractor {
    reader: Arc<dyn PackageMetadataReader>,
    quarantine: Quarantine,
}

impl MetadataExtractor {
    pub fn new(reader: Arc<dyn PackageMetadataReader>, quarantine: Quarantine) -> Self {
        Self { reader, quarantine }
    }

    pub fn quarantine(&self) -> &Quarantine {
        &self.quarantine
    }

    /// Read {name, version} or quarantine the archive
    ///
    /// Names that cannot be a leaf directory count as unreadable metadata.
    pub fn extract(&self, path: &Path) -> Option<PackageInfo> {
        let result = match classify(path) {
            ArchiveKind::Unrecognized => {
                Err(Error::UnrecognizedFormat(path.display().to_string()))
            }
            kind => self
                .reader
                .read_metadata(path, kind)
                .and_then(|info| check_package_name(&info.name).map(|_| info)),
        };

        match result {
            Ok(info) => {
                debug!("{} is {} {}", path.display(), info.name, info.version);
                Some(info)
            }
            Err(e) => {
                self.quarantine.isolate(path, &e);
                None
            }
        }
    }
}
