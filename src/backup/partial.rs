// dbvault/src/backup/partial.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::store::naming::partial_path;
use crate::store::remove_artifact_path;

/// An artifact being written under its `.partial` name. Dropping it without
/// [`PartialArtifact::commit`] removes whatever the tool produced so far.
#[derive(Debug)]
pub struct PartialArtifact {
    partial: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl PartialArtifact {
    pub fn for_destination(destination: &Path) -> Self {
        Self {
            partial: partial_path(destination),
            destination: destination.to_path_buf(),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.partial
    }

    /// Renames the partial artifact to its final name.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        fs::rename(&self.partial, &self.destination)?;
        self.committed = true;
        Ok(self.destination.clone())
    }
}

impl Drop for PartialArtifact {
    fn drop(&mut self) {
        if self.committed || fs::symlink_metadata(&self.partial).is_err() {
            return;
        }
        match remove_artifact_path(&self.partial) {
            Ok(()) => info!("Removed incomplete artifact {}", self.partial.display()),
            Err(e) => warn!(
                "Failed to remove incomplete artifact {}: {}",
                self.partial.display(),
                e
            ),
        }
    }
}
