// dbvault/src/retention/mod.rs
//! Age-based pruning of the artifact store. Deletion does not look at
//! validation status: an invalid backup expires like any other.
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info};

use crate::config::{AppConfig, RetentionPolicy};
use crate::errors::Result;
use crate::store::catalog::Catalog;
use crate::store::{ArtifactKind, ArtifactStore, remove_artifact_path};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub logical_removed: usize,
    pub physical_removed: usize,
    /// Stale `*.partial` leftovers of interrupted runs.
    pub partials_removed: usize,
    pub failures: usize,
}

impl CleanupReport {
    pub fn removed(&self, kind: ArtifactKind) -> usize {
        match kind {
            ArtifactKind::Logical => self.logical_removed,
            ArtifactKind::Physical => self.physical_removed,
        }
    }

    fn record_removed(&mut self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Logical => self.logical_removed += 1,
            ArtifactKind::Physical => self.physical_removed += 1,
        }
    }
}

/// Strictly older than the policy allows. Timestamps in the future are never
/// expired.
pub fn is_expired(modified: DateTime<Local>, now: DateTime<Local>, policy: RetentionPolicy) -> bool {
    (now - modified)
        .to_std()
        .map(|age| age > policy.max_age())
        .unwrap_or(false)
}

fn delete(path: &Path, what: &str) -> bool {
    match remove_artifact_path(path) {
        Ok(()) => {
            info!("🗑 Removed {} {}", what, path.display());
            true
        }
        Err(e) => {
            error!("Failed to remove {} {}: {}", what, path.display(), e);
            false
        }
    }
}

pub fn cleanup(catalog: &Catalog, policy: RetentionPolicy, now: DateTime<Local>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for kind in ArtifactKind::ALL {
        for artifact in catalog.artifacts(kind) {
            if !is_expired(artifact.modified, now, policy) {
                continue;
            }
            if delete(&artifact.location, "expired") {
                report.record_removed(kind);
            } else {
                report.failures += 1;
            }
        }
    }

    for partial in &catalog.partials {
        if !is_expired(partial.modified, now, policy) {
            continue;
        }
        if delete(&partial.location, "expired incomplete") {
            report.partials_removed += 1;
        } else {
            report.failures += 1;
        }
    }

    info!(
        "Retention ({} days): removed {} logical, {} physical, {} incomplete; {} failure(s)",
        policy.max_age_days,
        report.logical_removed,
        report.physical_removed,
        report.partials_removed,
        report.failures
    );
    report
}

/// Scans `store` and prunes it in one pass.
pub fn cleanup_store(store: &ArtifactStore, policy: RetentionPolicy) -> Result<CleanupReport> {
    let catalog = Catalog::scan(store)?;
    Ok(cleanup(&catalog, policy, Local::now()))
}

/// Retention pass run ahead of a new backup. Runs never overlap on one
/// store, so every `.partial` left at this point belongs to an interrupted
/// run and is removed whatever its age.
pub fn cleanup_before_backup(store: &ArtifactStore, policy: RetentionPolicy) -> Result<CleanupReport> {
    let catalog = Catalog::scan(store)?;
    let now = Local::now();
    let mut report = cleanup(&catalog, policy, now);

    for partial in &catalog.partials {
        if is_expired(partial.modified, now, policy) {
            continue;
        }
        if delete(&partial.location, "leftover incomplete") {
            report.partials_removed += 1;
        } else {
            report.failures += 1;
        }
    }
    Ok(report)
}

/// Public entry point for the cleanup command.
pub fn run_cleanup_flow(config: &AppConfig, max_age_days: Option<u32>) -> Result<CleanupReport> {
    let policy = max_age_days
        .map(|max_age_days| RetentionPolicy { max_age_days })
        .unwrap_or(config.retention);
    let store = ArtifactStore::new(&config.store_root);
    info!(
        "🧹 Cleaning artifacts older than {} days under {}",
        policy.max_age_days,
        store.root().display()
    );
    cleanup_store(&store, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::set_age_days;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::fs;

    fn stamp(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn logical(store: &ArtifactStore, target: &str, day: u32, age_days: u64) -> anyhow::Result<std::path::PathBuf> {
        let path = store.artifact_path(ArtifactKind::Logical, Some(target), &stamp(day));
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"dump")?;
        set_age_days(&path, age_days)?;
        Ok(path)
    }

    #[test]
    fn test_removes_only_expired_logical_artifact() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let old = logical(&store, "orders", 1, 10)?;
        let fresh = logical(&store, "orders", 8, 3)?;

        let report = cleanup_store(&store, RetentionPolicy { max_age_days: 7 })?;
        assert_eq!(report.removed(ArtifactKind::Logical), 1);
        assert_eq!(report.removed(ArtifactKind::Physical), 0);
        assert!(!old.exists());
        assert!(fresh.exists());

        let second = cleanup_store(&store, RetentionPolicy { max_age_days: 7 })?;
        assert_eq!(second, CleanupReport::default());
        assert!(fresh.exists());
        Ok(())
    }

    #[test]
    fn test_physical_directories_removed_recursively() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let old = store.artifact_path(ArtifactKind::Physical, None, &stamp(1));
        fs::create_dir_all(old.join("base/1"))?;
        fs::write(old.join("base/1/1259"), vec![0u8; 64])?;
        fs::write(old.join("backup_label"), "START WAL LOCATION: 0/2000028\n")?;
        set_age_days(&old, 30)?;

        let report = cleanup_store(&store, RetentionPolicy { max_age_days: 7 })?;
        assert_eq!(report.removed(ArtifactKind::Physical), 1);
        assert!(!old.exists());
        Ok(())
    }

    #[test]
    fn test_foreign_files_are_never_touched() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let logical_dir = store.kind_dir(ArtifactKind::Logical);
        fs::create_dir_all(&logical_dir)?;
        let notes = logical_dir.join("README.txt");
        let other_root = tmp.path().join("other");
        fs::write(&notes, "operator notes")?;
        fs::create_dir_all(&other_root)?;
        set_age_days(&notes, 400)?;
        set_age_days(&other_root, 400)?;

        let report = cleanup_store(&store, RetentionPolicy { max_age_days: 1 })?;
        assert_eq!(report, CleanupReport::default());
        assert!(notes.exists());
        assert!(other_root.exists());
        Ok(())
    }

    #[test]
    fn test_stale_partials_are_swept() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let physical_dir = store.kind_dir(ArtifactKind::Physical);
        let partial = physical_dir.join("basebackup_20260601_120000.partial");
        let recent = physical_dir.join("basebackup_20260620_120000.partial");
        fs::create_dir_all(partial.join("base"))?;
        fs::create_dir_all(&recent)?;
        set_age_days(&partial, 9)?;

        let report = cleanup_store(&store, RetentionPolicy { max_age_days: 7 })?;
        assert_eq!(report.partials_removed, 1);
        assert_eq!(report.removed(ArtifactKind::Physical), 0);
        assert!(!partial.exists());
        assert!(recent.exists());
        Ok(())
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Local::now();
        let policy = RetentionPolicy { max_age_days: 7 };
        assert!(!is_expired(now - Duration::days(7), now, policy));
        assert!(is_expired(now - Duration::days(7) - Duration::seconds(1), now, policy));
        assert!(!is_expired(now + Duration::days(1), now, policy));
    }

    #[test]
    fn test_failed_deletion_is_counted_and_skipped() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let removable = logical(&store, "orders", 1, 10)?;
        let mut catalog = Catalog::scan(&store)?;

        // A path below a regular file cannot be removed, even by root
        let blocker = tmp.path().join("not-a-directory");
        fs::write(&blocker, "x")?;
        let mut stuck = catalog.logical[0].clone();
        stuck.location = blocker.join("orders_20260602_120000.sql.gz");
        catalog.logical.insert(0, stuck);

        let report = cleanup(&catalog, RetentionPolicy { max_age_days: 7 }, Local::now());
        assert_eq!(report.failures, 1);
        assert_eq!(report.removed(ArtifactKind::Logical), 1);
        assert!(!removable.exists());
        assert!(blocker.exists());
        Ok(())
    }

    #[test]
    fn test_backup_pass_discards_recent_partials() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = ArtifactStore::new(tmp.path());
        let logical_dir = store.kind_dir(ArtifactKind::Logical);
        fs::create_dir_all(&logical_dir)?;
        let leftover = logical_dir.join("orders_20260620_120000.sql.gz.partial");
        fs::write(&leftover, "half a dump")?;
        let kept = logical(&store, "orders", 21, 1)?;
        let policy = RetentionPolicy { max_age_days: 7 };

        assert_eq!(cleanup_store(&store, policy)?.partials_removed, 0);
        assert!(leftover.exists());

        let report = cleanup_before_backup(&store, policy)?;
        assert_eq!(report.partials_removed, 1);
        assert_eq!(report.failures, 0);
        assert!(!leftover.exists());
        assert!(kept.exists());
        Ok(())
    }
}
