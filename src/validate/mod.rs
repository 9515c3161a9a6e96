// dbvault/src/validate/mod.rs
//! Structural checks over a finished artifact. Nothing is extracted or
//! restored; each check is cheap and contributes a tagged finding.
pub(crate) mod archive;
mod logical;
mod physical;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::{AppConfig, ValidationSettings};
use crate::errors::{AppError, Result};
use crate::store::{ArtifactKind, naming};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Fails the report on its own.
    Hard,
    /// Logged only.
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Check {
    Exists,
    SizeStability,
    CompressionIntegrity,
    SizeFloor,
    Content,
    ContentMarkers,
    Descriptor,
    DescriptorMarkers,
    VersionMarker,
    DataArchive,
    ArchiveIntegrity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: Check,
    pub message: String,
}

/// True iff none of the findings is hard.
pub fn passes(findings: &[Finding]) -> bool {
    findings.iter().all(|f| f.severity != Severity::Hard)
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub kind: ArtifactKind,
    pub location: PathBuf,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new(kind: ArtifactKind, location: &Path) -> Self {
        Self {
            kind,
            location: location.to_path_buf(),
            findings: Vec::new(),
        }
    }

    pub fn hard(&mut self, check: Check, message: impl Into<String>) {
        let message = message.into();
        error!("❌ [{:?}] {}: {}", check, self.location.display(), message);
        self.findings.push(Finding {
            severity: Severity::Hard,
            check,
            message,
        });
    }

    pub fn advisory(&mut self, check: Check, message: impl Into<String>) {
        let message = message.into();
        warn!("⚠️ [{:?}] {}: {}", check, self.location.display(), message);
        self.findings.push(Finding {
            severity: Severity::Advisory,
            check,
            message,
        });
    }

    pub fn passed(&self) -> bool {
        passes(&self.findings)
    }

    pub fn hard_errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Hard)
    }

    pub fn advisories(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Advisory)
    }

    #[cfg(test)]
    pub fn has(&self, severity: Severity, check: Check) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == severity && f.check == check)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "PASSED" } else { "FAILED" };
        writeln!(
            f,
            "{} backup {}: {} ({} hard, {} advisory)",
            self.kind,
            self.location.display(),
            verdict,
            self.hard_errors().count(),
            self.advisories().count()
        )?;
        for finding in &self.findings {
            let tag = match finding.severity {
                Severity::Hard => "ERROR",
                Severity::Advisory => "WARN ",
            };
            writeln!(f, "  {} {:?}: {}", tag, finding.check, finding.message)?;
        }
        Ok(())
    }
}

pub fn validate(kind: ArtifactKind, location: &Path, settings: &ValidationSettings) -> ValidationReport {
    info!("🔍 Validating {} backup at {}", kind, location.display());
    let report = match kind {
        ArtifactKind::Logical => logical::validate_logical(location, settings),
        ArtifactKind::Physical => physical::validate_physical(location, settings),
    };
    if report.passed() {
        info!(
            "✓ {} passed validation with {} advisory finding(s)",
            location.display(),
            report.advisories().count()
        );
    }
    report
}

/// Kind from the artifact name, falling back to the filesystem shape for
/// paths that do not follow the naming scheme.
pub fn detect_kind(location: &Path) -> Option<ArtifactKind> {
    if let Some(parsed) = naming::parse_artifact_path(location) {
        return Some(parsed.kind);
    }
    let metadata = std::fs::metadata(location).ok()?;
    let kind = if metadata.is_dir() {
        ArtifactKind::Physical
    } else {
        ArtifactKind::Logical
    };
    warn!(
        "{} does not follow the artifact naming scheme; treating it as a {} backup",
        location.display(),
        kind
    );
    Some(kind)
}

/// Public entry point for validating an existing artifact.
pub fn run_validate_flow(config: &AppConfig, location: &Path) -> Result<ValidationReport> {
    let kind = detect_kind(location).ok_or_else(|| {
        AppError::Config(format!("Artifact not found: {}", location.display()))
    })?;
    let report = validate(kind, location, &config.validation);
    print!("{}", report);
    ensure_passed(&report)?;
    Ok(report)
}

pub fn ensure_passed(report: &ValidationReport) -> Result<()> {
    if report.passed() {
        return Ok(());
    }
    Err(AppError::ValidationFailed {
        location: report.location.display().to_string(),
        hard_errors: report.hard_errors().count(),
    })
}
