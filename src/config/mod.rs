// dbvault/src/config/mod.rs
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AppError, Result};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "postgres";
const DEFAULT_PROBE_DB: &str = "postgres";
const DEFAULT_BACKUP_DIR: &str = "/backups";
const DEFAULT_RETENTION_DAYS: u32 = 7;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
const DEFAULT_MIN_LOGICAL_BYTES: u64 = 1024;
const DEFAULT_MIN_PHYSICAL_BYTES: u64 = 1024 * 1024;
const DEFAULT_STABILITY_WAIT_SECS: u64 = 2;
const DEFAULT_SETTLE_WAIT_SECS: u64 = 5;

// Structs for deserializing the optional JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonToolPaths {
    pub pg_dump: Option<PathBuf>,
    pub pg_dumpall: Option<PathBuf>,
    pub pg_basebackup: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonValidationOptions {
    pub min_logical_bytes: Option<u64>,
    pub min_physical_bytes: Option<u64>,
    pub stability_wait_secs: Option<u64>,
    pub settle_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub postgres_host: Option<String>,
    pub postgres_port: Option<u16>,
    pub postgres_user: Option<String>,
    pub postgres_db: Option<String>,
    pub passfile: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub retention_days: Option<u32>,
    pub physical_format: Option<PhysicalFormat>,
    pub compression_level: Option<u32>,
    pub tools: Option<JsonToolPaths>,
    pub validation: Option<JsonValidationOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    /// Database the connectivity probe connects to.
    pub probe_dbname: String,
    pub passfile: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn require_host(&self) -> Result<&str> {
        self.host
            .as_deref()
            .ok_or_else(|| AppError::Config("POSTGRES_HOST must be set".to_string()))
    }
}

/// Explicit tool locations. `None` means resolve from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub pg_dump: Option<PathBuf>,
    pub pg_dumpall: Option<PathBuf>,
    pub pg_basebackup: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicalFormat {
    /// Data directory copied as-is (`-Fp`).
    Plain,
    /// `base.tar.gz` plus `backup_manifest` (`-Ft -z`).
    Tar,
}

impl FromStr for PhysicalFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "p" => Ok(PhysicalFormat::Plain),
            "tar" | "t" => Ok(PhysicalFormat::Tar),
            other => Err(format!("unknown physical format '{}' (expected plain or tar)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub min_logical_bytes: u64,
    pub min_physical_bytes: u64,
    pub stability_wait: Duration,
    pub settle_wait: Duration,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_logical_bytes: DEFAULT_MIN_LOGICAL_BYTES,
            min_physical_bytes: DEFAULT_MIN_PHYSICAL_BYTES,
            stability_wait: Duration::from_secs(DEFAULT_STABILITY_WAIT_SECS),
            settle_wait: Duration::from_secs(DEFAULT_SETTLE_WAIT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub store_root: PathBuf,
    pub tools: ToolPaths,
    pub physical_format: PhysicalFormat,
    pub compression_level: u32,
    pub validation: ValidationSettings,
    pub retention: RetentionPolicy,
}

impl AppConfig {
    /// Builds the configuration from the optional JSON file and the process
    /// environment. Environment values win over the file.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let raw = match config_path {
            Some(path) => load_raw_json_config(path)?,
            None => RawJsonConfig::default(),
        };
        Self::from_sources(raw, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(raw: RawJsonConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tools_raw = raw.tools.unwrap_or_default();
        let validation_raw = raw.validation.unwrap_or_default();

        let database = DatabaseConfig {
            host: var("POSTGRES_HOST").or(raw.postgres_host),
            port: parse_var(&var, "POSTGRES_PORT")?
                .or(raw.postgres_port)
                .unwrap_or(DEFAULT_PORT),
            user: var("POSTGRES_USER")
                .or(raw.postgres_user)
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            probe_dbname: var("POSTGRES_DB")
                .or(raw.postgres_db)
                .unwrap_or_else(|| DEFAULT_PROBE_DB.to_string()),
            passfile: var("PGPASSFILE")
                .map(PathBuf::from)
                .or(raw.passfile)
                .or_else(|| var("HOME").map(|home| PathBuf::from(home).join(".pgpass"))),
        };

        let store_root = var("BACKUP_DIR")
            .map(PathBuf::from)
            .or(raw.backup_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        if store_root.as_os_str().is_empty() {
            return Err(AppError::Config("BACKUP_DIR cannot be empty".to_string()));
        }

        let tools = ToolPaths {
            pg_dump: var("PG_DUMP_BIN").map(PathBuf::from).or(tools_raw.pg_dump),
            pg_dumpall: var("PG_DUMPALL_BIN").map(PathBuf::from).or(tools_raw.pg_dumpall),
            pg_basebackup: var("PG_BASEBACKUP_BIN")
                .map(PathBuf::from)
                .or(tools_raw.pg_basebackup),
        };

        let physical_format = parse_var(&var, "BACKUP_PHYSICAL_FORMAT")?
            .or(raw.physical_format)
            .unwrap_or(PhysicalFormat::Plain);

        let compression_level = parse_var(&var, "BACKUP_COMPRESSION_LEVEL")?
            .or(raw.compression_level)
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        if compression_level > 9 {
            return Err(AppError::Config(format!(
                "BACKUP_COMPRESSION_LEVEL must be between 0 and 9, got {}",
                compression_level
            )));
        }

        let defaults = ValidationSettings::default();
        let validation = ValidationSettings {
            min_logical_bytes: parse_var(&var, "BACKUP_MIN_LOGICAL_BYTES")?
                .or(validation_raw.min_logical_bytes)
                .unwrap_or(defaults.min_logical_bytes),
            min_physical_bytes: parse_var(&var, "BACKUP_MIN_PHYSICAL_BYTES")?
                .or(validation_raw.min_physical_bytes)
                .unwrap_or(defaults.min_physical_bytes),
            stability_wait: validation_raw
                .stability_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stability_wait),
            settle_wait: validation_raw
                .settle_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.settle_wait),
        };

        let retention = RetentionPolicy {
            max_age_days: parse_var(&var, "RETENTION_DAYS")?
                .or(raw.retention_days)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
        };

        Ok(AppConfig {
            database,
            store_root,
            tools,
            physical_format,
            compression_level,
            validation,
            retention,
        })
    }
}

pub fn load_raw_json_config(config_path: &Path) -> Result<RawJsonConfig> {
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;
    serde_json::from_str(&config_content).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse JSON from config file at {}: {}",
            config_path.display(),
            e
        ))
    })
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e))),
        None => Ok(None),
    }
}
