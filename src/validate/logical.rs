// dbvault/src/validate/logical.rs
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::thread;
use tracing::{debug, info};

use super::archive::{read_gzip_head, verify_gzip_stream};
use super::{Check, ValidationReport};
use crate::config::ValidationSettings;
use crate::store::ArtifactKind;

const HEAD_BYTES: u64 = 64 * 1024;

// pg_dump and pg_dumpall headers, or the statements a plain dump opens with
static DUMP_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(-- PostgreSQL database (cluster )?dump|SET \w+|CREATE \w+)")
        .expect("dump marker pattern is valid")
});

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

pub fn validate_logical(location: &Path, settings: &ValidationSettings) -> ValidationReport {
    let mut report = ValidationReport::new(ArtifactKind::Logical, location);

    // 1. Exists and non-empty
    let initial_size = match fs::metadata(location) {
        Ok(metadata) if !metadata.is_file() => {
            report.hard(Check::Exists, "not a regular file");
            return report;
        }
        Ok(metadata) if metadata.len() == 0 => {
            report.hard(Check::Exists, "file is empty");
            return report;
        }
        Ok(metadata) => metadata.len(),
        Err(e) => {
            report.hard(Check::Exists, format!("cannot stat file: {}", e));
            return report;
        }
    };

    // 2. Size stability
    check_size_stability(&mut report, location, settings, initial_size);

    // 3. Compression integrity
    match verify_gzip_stream(location) {
        Ok(decompressed) => debug!(
            "gzip stream of {} is intact ({} bytes decompressed)",
            location.display(),
            decompressed
        ),
        Err(e) => report.hard(Check::CompressionIntegrity, format!("gzip integrity check failed: {}", e)),
    }

    // 4. Size floor
    let size = file_size(location).unwrap_or(initial_size);
    if size <= settings.min_logical_bytes {
        report.hard(
            Check::SizeFloor,
            format!(
                "{} bytes is not above the {} byte minimum; the dump probably captured nothing",
                size, settings.min_logical_bytes
            ),
        );
    }

    // 5. Content plausibility
    match read_gzip_head(location, HEAD_BYTES) {
        Ok(head) if head.is_empty() => {
            report.hard(Check::Content, "decompressed stream is empty");
        }
        Ok(head) => {
            let text = String::from_utf8_lossy(&head);
            if DUMP_MARKERS.is_match(&text) {
                debug!("Found dump markers in {}", location.display());
            } else {
                report.advisory(
                    Check::ContentMarkers,
                    format!("no dump markers in the first {} decompressed bytes", head.len()),
                );
            }
        }
        Err(e) => report.hard(Check::Content, format!("cannot decompress leading content: {}", e)),
    }

    report
}

fn check_size_stability(
    report: &mut ValidationReport,
    location: &Path,
    settings: &ValidationSettings,
    first: u64,
) {
    thread::sleep(settings.stability_wait);
    let second = file_size(location).unwrap_or(first);
    if second == first {
        return;
    }

    info!(
        "{} is still changing ({} -> {} bytes), waiting {:?} before continuing",
        location.display(),
        first,
        second,
        settings.settle_wait
    );
    thread::sleep(settings.settle_wait);
    let third = file_size(location).unwrap_or(second);
    if third != second {
        report.advisory(
            Check::SizeStability,
            format!("size still changing ({} -> {} bytes); a writer may be active", second, third),
        );
    }
}
