// dbvault/src/store/mod.rs
pub mod catalog;
pub mod naming;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// SQL-level dump compressed with gzip.
    Logical,
    /// Base backup of the cluster data directory.
    Physical,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Logical, ArtifactKind::Physical];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Logical => "logical",
            ArtifactKind::Physical => "physical",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A completed backup found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub target: Option<String>,
    /// Timestamp encoded in the artifact name.
    pub stamp: NaiveDateTime,
    /// Filesystem modification time; retention ages artifacts by this.
    pub modified: DateTime<Local>,
    pub location: PathBuf,
    pub size_bytes: u64,
}

impl Artifact {
    /// Builds the record for `location`, or `None` when the name or the
    /// filesystem shape is not a recognizable artifact.
    pub fn from_path(location: &Path) -> io::Result<Option<Artifact>> {
        let Some(parsed) = naming::parse_artifact_path(location) else {
            return Ok(None);
        };
        let metadata = fs::symlink_metadata(location)?;
        let shape_matches = match parsed.kind {
            ArtifactKind::Logical => metadata.is_file(),
            ArtifactKind::Physical => metadata.is_dir(),
        };
        if !shape_matches {
            return Ok(None);
        }

        Ok(Some(Artifact {
            kind: parsed.kind,
            target: parsed.target,
            stamp: parsed.stamp,
            modified: DateTime::<Local>::from(metadata.modified()?),
            location: location.to_path_buf(),
            size_bytes: path_size(location)?,
        }))
    }

    pub fn name(&self) -> String {
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Root of the artifact tree with one subdirectory per kind.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn artifact_path(
        &self,
        kind: ArtifactKind,
        target: Option<&str>,
        stamp: &NaiveDateTime,
    ) -> PathBuf {
        naming::artifact_path(&self.root, kind, target, stamp)
    }

    /// Creates the kind directories and proves each one accepts new files.
    pub fn ensure_writable(&self) -> Result<()> {
        for kind in ArtifactKind::ALL {
            let dir = self.kind_dir(kind);
            fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!(
                    "Failed to create artifact directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            tempfile::Builder::new()
                .prefix(".write-check")
                .tempfile_in(&dir)
                .map_err(|e| {
                    AppError::Config(format!(
                        "Artifact directory {} is not writable: {}",
                        dir.display(),
                        e
                    ))
                })?;
        }
        Ok(())
    }
}

/// Size of a file, or the sum of regular file sizes below a directory.
pub fn path_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}

/// Removes a file or a whole directory tree. Missing paths are not an error.
pub fn remove_artifact_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
