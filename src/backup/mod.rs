pub(crate) mod db_dump;
pub(crate) mod partial;

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::retention::{self, CleanupReport};
use crate::store::naming::validate_target;
use crate::store::{Artifact, ArtifactKind, ArtifactStore};
use crate::utils::setting::{ConnectivityProbe, preflight};
use crate::validate::{self, ValidationReport};

#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub kind: ArtifactKind,
    /// Single database for a logical backup; `None` dumps the whole cluster.
    pub target: Option<String>,
    pub validate: bool,
}

#[derive(Debug)]
pub struct BackupOutcome {
    pub artifact: Artifact,
    pub cleanup: Option<CleanupReport>,
    pub report: Option<ValidationReport>,
}

fn current_stamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Public entry point for the backup process.
///
/// Preflight, then retention cleanup to reclaim space (including any
/// `.partial` an interrupted run left behind), then the artifact
/// itself, then optional validation. A failed validation fails the run but
/// keeps the artifact on disk for inspection.
pub fn run_backup_flow(
    config: &AppConfig,
    request: &BackupRequest,
    probe: &dyn ConnectivityProbe,
) -> Result<BackupOutcome> {
    if let Some(target) = &request.target {
        if request.kind == ArtifactKind::Physical {
            return Err(AppError::Config(
                "a database name only applies to logical backups".to_string(),
            ));
        }
        validate_target(target)?;
    }

    info!("🚀 Starting {} backup", request.kind);
    let store = ArtifactStore::new(&config.store_root);
    preflight(config, &store, probe)?;

    let cleanup = match retention::cleanup_before_backup(&store, config.retention) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("Retention cleanup before backup failed, continuing: {}", e);
            None
        }
    };

    let stamp = current_stamp();
    let artifact = match request.kind {
        ArtifactKind::Logical => {
            db_dump::create_logical_backup(config, &store, request.target.as_deref(), &stamp)?
        }
        ArtifactKind::Physical => db_dump::create_physical_backup(config, &store, &stamp)?,
    };

    let report = if request.validate {
        let report = validate::validate(artifact.kind, &artifact.location, &config.validation);
        print!("{}", report);
        validate::ensure_passed(&report)?;
        Some(report)
    } else {
        None
    };

    info!("🎉 Backup completed: {}", artifact.location.display());
    Ok(BackupOutcome {
        artifact,
        cleanup,
        report,
    })
}
