// dbvault/src/store/naming.rs
//! Artifact names encode kind, target and timestamp so the filesystem can act
//! as the catalog:
//!
//! * `logical/<target>_<YYYYmmdd_HHMMSS>.sql.gz`
//! * `logical/all_databases_<YYYYmmdd_HHMMSS>.sql.gz`
//! * `physical/basebackup_<YYYYmmdd_HHMMSS>/`
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use super::ArtifactKind;
use crate::errors::{AppError, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const LOGICAL_EXTENSION: &str = ".sql.gz";
pub const ALL_DATABASES: &str = "all_databases";
pub const PHYSICAL_PREFIX: &str = "basebackup_";
pub const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub kind: ArtifactKind,
    pub target: Option<String>,
    pub stamp: NaiveDateTime,
}

fn is_valid_target_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Rejects database names that cannot be encoded into an artifact name
/// without losing the round trip.
pub fn validate_target(target: &str) -> Result<()> {
    if target.trim().is_empty() || !target.chars().all(is_valid_target_char) {
        return Err(AppError::Config(format!(
            "Invalid database name '{}': only ASCII letters, digits, '_' and '-' are allowed",
            target
        )));
    }
    if target == ALL_DATABASES {
        return Err(AppError::Config(format!(
            "'{}' is reserved for whole-cluster dumps and cannot be used as a database name",
            ALL_DATABASES
        )));
    }
    Ok(())
}

pub fn format_stamp(stamp: &NaiveDateTime) -> String {
    stamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn artifact_file_name(kind: ArtifactKind, target: Option<&str>, stamp: &NaiveDateTime) -> String {
    match kind {
        ArtifactKind::Logical => format!(
            "{}_{}{}",
            target.unwrap_or(ALL_DATABASES),
            format_stamp(stamp),
            LOGICAL_EXTENSION
        ),
        ArtifactKind::Physical => format!("{}{}", PHYSICAL_PREFIX, format_stamp(stamp)),
    }
}

pub fn artifact_path(
    store_root: &Path,
    kind: ArtifactKind,
    target: Option<&str>,
    stamp: &NaiveDateTime,
) -> PathBuf {
    store_root
        .join(kind.dir_name())
        .join(artifact_file_name(kind, target, stamp))
}

fn parse_stamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(date, 8) || !digits(time, 6) {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{}_{}", date, time), TIMESTAMP_FORMAT).ok()
}

/// Parses a bare artifact name (no directory, no `.partial` suffix).
pub fn parse_artifact_name(name: &str) -> Option<ParsedName> {
    if let Some(stem) = name.strip_suffix(LOGICAL_EXTENSION) {
        let mut parts = stem.rsplitn(3, '_');
        let time = parts.next()?;
        let date = parts.next()?;
        let target = parts.next()?;
        let stamp = parse_stamp(date, time)?;
        let target = if target == ALL_DATABASES {
            None
        } else if !target.is_empty() && target.chars().all(is_valid_target_char) {
            Some(target.to_string())
        } else {
            return None;
        };
        return Some(ParsedName {
            kind: ArtifactKind::Logical,
            target,
            stamp,
        });
    }

    let rest = name.strip_prefix(PHYSICAL_PREFIX)?;
    let (date, time) = rest.split_once('_')?;
    Some(ParsedName {
        kind: ArtifactKind::Physical,
        target: None,
        stamp: parse_stamp(date, time)?,
    })
}

pub fn parse_artifact_path(path: &Path) -> Option<ParsedName> {
    parse_artifact_name(path.file_name()?.to_str()?)
}

/// Name of the in-progress sibling of an artifact.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
