// dbvault/src/store/catalog.rs
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::naming::{self, PARTIAL_SUFFIX};
use super::{Artifact, ArtifactKind, ArtifactStore, format_size};
use crate::config::AppConfig;
use crate::errors::Result;

/// In-progress artifact left behind by a run that never committed it.
#[derive(Debug, Clone, Serialize)]
pub struct PartialEntry {
    pub kind: ArtifactKind,
    pub location: PathBuf,
    pub modified: DateTime<Local>,
}

/// Typed index of the artifact store, built by a single scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub logical: Vec<Artifact>,
    pub physical: Vec<Artifact>,
    pub partials: Vec<PartialEntry>,
}

impl Catalog {
    /// Scans the kind directories. Entries that do not match a known naming
    /// pattern are skipped; a missing kind directory is an empty population.
    pub fn scan(store: &ArtifactStore) -> io::Result<Catalog> {
        let mut catalog = Catalog::default();
        for kind in ArtifactKind::ALL {
            let dir = store.kind_dir(kind);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Artifact directory {} does not exist yet", dir.display());
                    continue;
                }
                Err(e) => return Err(e),
            };

            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();

                if let Some(base) = name.strip_suffix(PARTIAL_SUFFIX) {
                    match naming::parse_artifact_name(base) {
                        Some(parsed) if parsed.kind == kind => {
                            let modified = entry.metadata()?.modified()?;
                            catalog.partials.push(PartialEntry {
                                kind,
                                location: path,
                                modified: DateTime::<Local>::from(modified),
                            });
                        }
                        _ => debug!("Ignoring non-artifact entry {}", path.display()),
                    }
                    continue;
                }

                match Artifact::from_path(&path) {
                    Ok(Some(artifact)) if artifact.kind == kind => catalog.push(artifact),
                    Ok(_) => debug!("Ignoring non-artifact entry {}", path.display()),
                    Err(e) => warn!("Skipping unreadable entry {}: {}", path.display(), e),
                }
            }
        }
        Ok(catalog)
    }

    fn push(&mut self, artifact: Artifact) {
        match artifact.kind {
            ArtifactKind::Logical => self.logical.push(artifact),
            ArtifactKind::Physical => self.physical.push(artifact),
        }
    }

    pub fn artifacts(&self, kind: ArtifactKind) -> &[Artifact] {
        match kind {
            ArtifactKind::Logical => &self.logical,
            ArtifactKind::Physical => &self.physical,
        }
    }

    pub fn total_bytes(&self, kind: ArtifactKind) -> u64 {
        self.artifacts(kind).iter().map(|a| a.size_bytes).sum()
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        for kind in ArtifactKind::ALL {
            let artifacts = self.artifacts(kind);
            out.push_str(&format!("{} backups ({}):\n", kind, artifacts.len()));
            if artifacts.is_empty() {
                out.push_str("  (none)\n");
            }
            for artifact in artifacts {
                out.push_str(&format!(
                    "  {:<48} {:>12}  {}\n",
                    artifact.name(),
                    format_size(artifact.size_bytes),
                    artifact.modified.format("%Y-%m-%d %H:%M:%S")
                ));
            }
            out.push_str(&format!("  total: {}\n\n", format_size(self.total_bytes(kind))));
        }
        if !self.partials.is_empty() {
            out.push_str(&format!("incomplete ({}):\n", self.partials.len()));
            for partial in &self.partials {
                out.push_str(&format!(
                    "  {}  {}\n",
                    partial.location.display(),
                    partial.modified.format("%Y-%m-%d %H:%M:%S")
                ));
            }
        }
        out
    }
}

/// Public entry point for listing the artifact store.
pub fn run_list_flow(config: &AppConfig, json: bool) -> Result<Catalog> {
    let store = ArtifactStore::new(&config.store_root);
    info!("📂 Listing artifacts under {}", store.root().display());
    let catalog = Catalog::scan(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        print!("{}", catalog.render_table());
    }
    Ok(catalog)
}
