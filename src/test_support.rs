// Shared fixtures for unit tests
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::{
    AppConfig, DatabaseConfig, PhysicalFormat, RetentionPolicy, ToolPaths, ValidationSettings,
};
use crate::errors::{AppError, Result};
use crate::utils::setting::ConnectivityProbe;

/// Writes an executable `/bin/sh` script standing in for a client tool.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = File::create(&path)?;
        writeln!(file, "#!/bin/sh")?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

pub struct StubProbe {
    reachable: bool,
}

impl StubProbe {
    pub fn reachable() -> Self {
        Self { reachable: true }
    }

    pub fn unreachable() -> Self {
        Self { reachable: false }
    }
}

impl ConnectivityProbe for StubProbe {
    fn check(&self, database: &DatabaseConfig) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(AppError::Connectivity(format!(
                "stub refused {}:{}",
                database.host.as_deref().unwrap_or("?"),
                database.port
            )))
        }
    }
}

pub fn quick_validation() -> ValidationSettings {
    ValidationSettings {
        stability_wait: Duration::ZERO,
        settle_wait: Duration::ZERO,
        ..ValidationSettings::default()
    }
}

pub fn test_config(store_root: &Path) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            host: Some("db.test".to_string()),
            port: 5432,
            user: "postgres".to_string(),
            probe_dbname: "postgres".to_string(),
            passfile: None,
        },
        store_root: store_root.to_path_buf(),
        tools: ToolPaths::default(),
        physical_format: PhysicalFormat::Plain,
        compression_level: 6,
        validation: quick_validation(),
        retention: RetentionPolicy { max_age_days: 7 },
    }
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Deterministic bytes that do not compress well.
pub fn noisy_bytes(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Writes a gzipped tar with `entries` small relation files.
pub fn write_base_tar_gz(path: &Path, entries: usize) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for i in 0..entries {
        let data = noisy_bytes(2048);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder.append_data(&mut header, format!("base/1/{}", 1259 + i), data.as_slice())?;
    }
    builder.into_inner()?.finish()?.sync_all()
}

/// Backdates the modification time of a file or directory.
pub fn set_age_days(path: &Path, days: u64) -> io::Result<()> {
    let modified = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    File::open(path)?.set_modified(modified)
}
