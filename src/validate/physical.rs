// dbvault/src/validate/physical.rs
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use super::archive::verify_tar_archive;
use super::{Check, ValidationReport};
use crate::config::ValidationSettings;
use crate::store::{ArtifactKind, format_size, path_size};

pub const BACKUP_LABEL: &str = "backup_label";
pub const BACKUP_MANIFEST: &str = "backup_manifest";
pub const VERSION_FILE: &str = "PG_VERSION";

static LABEL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^START WAL LOCATION: [0-9A-F]+/[0-9A-F]+").expect("label pattern is valid")
});

static MANIFEST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""PostgreSQL-Backup-Manifest-Version"\s*:\s*\d+"#).expect("manifest pattern is valid")
});

enum DataShape {
    TarGz,
    Tar,
    Directory,
}

pub fn validate_physical(location: &Path, settings: &ValidationSettings) -> ValidationReport {
    let mut report = ValidationReport::new(ArtifactKind::Physical, location);

    // 1. Directory exists
    if !location.is_dir() {
        report.hard(Check::Exists, "backup directory does not exist");
        return report;
    }

    // 2. Descriptor present, markers advisory
    let mut descriptor_found = false;
    for (name, marker) in [(BACKUP_LABEL, &*LABEL_MARKER), (BACKUP_MANIFEST, &*MANIFEST_MARKER)] {
        let path = location.join(name);
        if !path.is_file() {
            continue;
        }
        descriptor_found = true;
        match fs::read(&path) {
            Ok(bytes) if marker.is_match(&String::from_utf8_lossy(&bytes)) => {
                debug!("{} carries the expected markers", path.display());
            }
            Ok(_) => report.advisory(
                Check::DescriptorMarkers,
                format!("{} does not contain the expected markers", name),
            ),
            Err(e) => report.advisory(Check::DescriptorMarkers, format!("cannot read {}: {}", name, e)),
        }
    }
    if !descriptor_found {
        report.hard(
            Check::Descriptor,
            format!("neither {} nor {} is present", BACKUP_LABEL, BACKUP_MANIFEST),
        );
    }

    // 3. Version marker
    if !location.join(VERSION_FILE).is_file() {
        report.advisory(Check::VersionMarker, format!("{} is missing", VERSION_FILE));
    }

    // 4. Data archive or directory
    let shapes = [
        ("base.tar.gz", DataShape::TarGz),
        ("base.tar", DataShape::Tar),
        ("base", DataShape::Directory),
    ];
    let mut data_found = false;
    for (name, shape) in shapes {
        let path = location.join(name);
        let gzipped = match shape {
            DataShape::Directory => {
                if path.is_dir() {
                    data_found = true;
                }
                continue;
            }
            DataShape::TarGz => true,
            DataShape::Tar => false,
        };
        if !path.is_file() {
            continue;
        }
        data_found = true;
        match verify_tar_archive(&path, gzipped) {
            Ok(0) => report.advisory(Check::ArchiveIntegrity, format!("{} contains no entries", name)),
            Ok(entries) => debug!("{} read cleanly ({} entries)", path.display(), entries),
            Err(e) => report.advisory(
                Check::ArchiveIntegrity,
                format!("{} failed its integrity check: {}", name, e),
            ),
        }
    }
    if !data_found {
        report.hard(
            Check::DataArchive,
            "no base.tar.gz, base.tar or base/ data found",
        );
    }

    // 5. Size floor over the whole tree
    match path_size(location) {
        Ok(size) if size < settings.min_physical_bytes => report.advisory(
            Check::SizeFloor,
            format!(
                "backup totals {}, below the expected minimum of {}",
                format_size(size),
                format_size(settings.min_physical_bytes)
            ),
        ),
        Ok(_) => {}
        Err(e) => report.advisory(Check::SizeFloor, format!("cannot measure backup size: {}", e)),
    }

    report
}
