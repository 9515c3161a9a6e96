// dbvault/src/backup/db_dump.rs
use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{error, info};

use super::partial::PartialArtifact;
use crate::config::{AppConfig, DatabaseConfig, PhysicalFormat};
use crate::errors::{AppError, Result};
use crate::store::naming::{partial_path, validate_target};
use crate::store::{Artifact, ArtifactKind, ArtifactStore, format_size, path_size};
use crate::utils::find_executable;

/// One external tool run: program, arguments, extra environment.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl ToolInvocation {
    fn new(tool: &'static str, program: PathBuf, database: &DatabaseConfig) -> Result<Self> {
        let host = database.require_host()?;
        let mut invocation = Self {
            tool,
            program,
            args: Vec::new(),
            envs: Vec::new(),
        };
        invocation
            .arg("-h")
            .arg(host)
            .arg("-p")
            .arg(database.port.to_string())
            .arg("-U")
            .arg(&database.user)
            // Never prompt; the passfile is the only credential source
            .arg("-w");
        if let Some(passfile) = &database.passfile {
            invocation
                .envs
                .push((OsString::from("PGPASSFILE"), passfile.as_os_str().to_owned()));
        }
        Ok(invocation)
    }

    fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(self.envs.iter().cloned()).stdin(Stdio::null());
        command
    }

    fn spawn(&self, command: &mut Command) -> Result<Child> {
        command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => AppError::Config(format!(
                "{} at {} could not be executed: {}",
                self.tool,
                self.program.display(),
                e
            )),
            _ => AppError::Io(e),
        })
    }
}

/// Exit status and captured diagnostics of a finished tool.
#[derive(Debug)]
pub struct ToolOutcome {
    pub status: ExitStatus,
    pub stderr: String,
    /// Bytes the tool wrote to stdout, before compression.
    pub stdout_bytes: u64,
}

impl ToolOutcome {
    fn into_result(self, tool: &str) -> Result<Self> {
        if self.status.success() {
            return Ok(self);
        }
        error!("{} failed with {}:\n{}", tool, self.status, self.stderr.trim_end());
        Err(AppError::Subprocess {
            tool: tool.to_string(),
            status: self.status,
            stderr: self.stderr,
        })
    }
}

fn read_captured(mut capture: File) -> io::Result<String> {
    capture.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    capture.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn compress_into<R: Read>(source: &mut R, output: File, level: u32) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::new(level));
    let copied = io::copy(source, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(copied)
}

/// Runs the tool with stdout streamed through gzip into `destination`.
/// stderr goes to an anonymous temp file so neither pipe can fill up.
pub fn run_streaming_gzip(invocation: &ToolInvocation, destination: &Path, level: u32) -> Result<ToolOutcome> {
    let output = File::create(destination).map_err(|e| {
        AppError::Config(format!("Cannot write artifact {}: {}", destination.display(), e))
    })?;
    let capture = tempfile::tempfile()?;

    let mut command = invocation.command();
    command.stdout(Stdio::piped()).stderr(Stdio::from(capture.try_clone()?));
    let mut child = invocation.spawn(&mut command)?;

    let streamed = match child.stdout.take() {
        Some(mut stdout) => compress_into(&mut stdout, output, level),
        None => Err(io::Error::other("stdout of the tool was not captured")),
    };

    let stdout_bytes = match streamed {
        Ok(copied) => copied,
        Err(e) => {
            // Do not leave the tool blocked on a pipe nobody reads
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::Backup(format!(
                "Failed to stream {} output into {}: {}",
                invocation.tool,
                destination.display(),
                e
            )));
        }
    };

    let status = child.wait()?;
    Ok(ToolOutcome {
        status,
        stderr: read_captured(capture)?,
        stdout_bytes,
    })
}

/// Runs the tool to completion, discarding stdout and capturing stderr.
pub fn run_to_completion(invocation: &ToolInvocation) -> Result<ToolOutcome> {
    let capture = tempfile::tempfile()?;
    let mut command = invocation.command();
    command.stdout(Stdio::null()).stderr(Stdio::from(capture.try_clone()?));
    let status = invocation.spawn(&mut command)?.wait()?;
    Ok(ToolOutcome {
        status,
        stderr: read_captured(capture)?,
        stdout_bytes: 0,
    })
}

pub fn logical_invocation(config: &AppConfig, target: Option<&str>) -> Result<ToolInvocation> {
    match target {
        Some(dbname) => {
            let program = find_executable("pg_dump", config.tools.pg_dump.as_deref())?;
            let mut invocation = ToolInvocation::new("pg_dump", program, &config.database)?;
            invocation.arg(format!("--dbname={}", dbname));
            Ok(invocation)
        }
        None => {
            let program = find_executable("pg_dumpall", config.tools.pg_dumpall.as_deref())?;
            ToolInvocation::new("pg_dumpall", program, &config.database)
        }
    }
}

pub fn physical_invocation(config: &AppConfig, destination: &Path) -> Result<ToolInvocation> {
    let program = find_executable("pg_basebackup", config.tools.pg_basebackup.as_deref())?;
    let mut invocation = ToolInvocation::new("pg_basebackup", program, &config.database)?;
    invocation
        .arg("-D")
        .arg(destination)
        .arg("--checkpoint=fast");
    match config.physical_format {
        PhysicalFormat::Plain => invocation.arg("-Fp").arg("-Xstream"),
        PhysicalFormat::Tar => invocation.arg("-Ft").arg("-z").arg("-Xfetch"),
    };
    Ok(invocation)
}

fn ensure_vacant(destination: &Path) -> Result<()> {
    if destination.exists() || partial_path(destination).exists() {
        return Err(AppError::Backup(format!(
            "{} already exists; another run used the same timestamp",
            destination.display()
        )));
    }
    Ok(())
}

fn committed_artifact(location: &Path) -> Result<Artifact> {
    Artifact::from_path(location)?.ok_or_else(|| {
        AppError::Backup(format!("{} is not a recognizable artifact", location.display()))
    })
}

/// Dumps one database (`pg_dump`) or the whole cluster (`pg_dumpall`) into a
/// gzip file.
pub fn create_logical_backup(
    config: &AppConfig,
    store: &ArtifactStore,
    target: Option<&str>,
    stamp: &NaiveDateTime,
) -> Result<Artifact> {
    if let Some(dbname) = target {
        validate_target(dbname)?;
    }
    let destination = store.artifact_path(ArtifactKind::Logical, target, stamp);
    ensure_vacant(&destination)?;
    let invocation = logical_invocation(config, target)?;

    info!(
        "🔍 Starting logical backup of {} with {} into {}",
        target.unwrap_or("all databases"),
        invocation.tool,
        destination.display()
    );
    let partial = PartialArtifact::for_destination(&destination);
    let outcome = run_streaming_gzip(&invocation, partial.path(), config.compression_level)?
        .into_result(invocation.tool)?;
    if outcome.stdout_bytes == 0 {
        return Err(AppError::Backup(format!(
            "{} exited successfully but produced no output",
            invocation.tool
        )));
    }

    let location = partial.commit()?;
    let artifact = committed_artifact(&location)?;
    info!(
        "✓ Logical backup written to {} ({}, {} uncompressed)",
        location.display(),
        format_size(artifact.size_bytes),
        format_size(outcome.stdout_bytes)
    );
    Ok(artifact)
}

/// Takes a base backup of the cluster into a directory.
pub fn create_physical_backup(
    config: &AppConfig,
    store: &ArtifactStore,
    stamp: &NaiveDateTime,
) -> Result<Artifact> {
    let destination = store.artifact_path(ArtifactKind::Physical, None, stamp);
    ensure_vacant(&destination)?;

    let partial = PartialArtifact::for_destination(&destination);
    let invocation = physical_invocation(config, partial.path())?;
    info!(
        "🔍 Starting physical backup with {} into {}",
        invocation.tool,
        destination.display()
    );
    run_to_completion(&invocation)?.into_result(invocation.tool)?;

    let size = if partial.path().is_dir() {
        path_size(partial.path())?
    } else {
        0
    };
    if size == 0 {
        return Err(AppError::Backup(format!(
            "{} exited successfully but wrote nothing to {}",
            invocation.tool,
            partial.path().display()
        )));
    }

    let location = partial.commit()?;
    let artifact = committed_artifact(&location)?;
    info!(
        "✓ Physical backup written to {} ({})",
        location.display(),
        format_size(artifact.size_bytes)
    );
    Ok(artifact)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{test_config, write_script};
    use flate2::read::GzDecoder;
    use std::fs;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 3)
            .and_then(|d| d.and_hms_opt(4, 5, 6))
            .unwrap()
    }

    #[test]
    fn test_logical_invocation_arguments() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(tmp.path());
        config.tools.pg_dump = Some(write_script(tmp.path(), "pg_dump", "exit 0")?);
        config.database.passfile = Some(PathBuf::from("/run/secrets/pgpass"));

        let invocation = logical_invocation(&config, Some("orders"))?;
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["-h", "db.test", "-p", "5432", "-U", "postgres", "-w", "--dbname=orders"]
        );
        assert_eq!(invocation.envs[0].1, OsString::from("/run/secrets/pgpass"));
        Ok(())
    }

    #[test]
    fn test_physical_invocation_follows_format() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(tmp.path());
        config.tools.pg_basebackup = Some(write_script(tmp.path(), "pg_basebackup", "exit 0")?);
        config.physical_format = PhysicalFormat::Tar;

        let invocation = physical_invocation(&config, Path::new("/b/physical/x.partial"))?;
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-D", "/b/physical/x.partial"]));
        assert!(args.iter().any(|a| a == "-Ft"));
        assert!(args.iter().any(|a| a == "-z"));
        Ok(())
    }

    #[test]
    fn test_streamed_output_is_gzipped() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(&tmp.path().join("store"));
        config.tools.pg_dumpall = Some(write_script(
            tmp.path(),
            "pg_dumpall",
            "echo '-- PostgreSQL database cluster dump'\necho 'CREATE ROLE app;'",
        )?);
        let store = ArtifactStore::new(&config.store_root);
        store.ensure_writable()?;

        let artifact = create_logical_backup(&config, &store, None, &stamp())?;
        assert_eq!(artifact.target, None);
        assert_eq!(artifact.name(), "all_databases_20260203_040506.sql.gz");

        let mut text = String::new();
        GzDecoder::new(File::open(&artifact.location)?).read_to_string(&mut text)?;
        assert_eq!(text, "-- PostgreSQL database cluster dump\nCREATE ROLE app;\n");
        Ok(())
    }

    #[test]
    fn test_failed_dump_removes_partial_and_keeps_stderr() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(&tmp.path().join("store"));
        config.tools.pg_dump = Some(write_script(
            tmp.path(),
            "pg_dump",
            "echo 'partial output'\necho 'pg_dump: error: database \"orders\" does not exist' >&2\nexit 1",
        )?);
        let store = ArtifactStore::new(&config.store_root);
        store.ensure_writable()?;

        let result = create_logical_backup(&config, &store, Some("orders"), &stamp());
        match result {
            Err(AppError::Subprocess { tool, stderr, .. }) => {
                assert_eq!(tool, "pg_dump");
                assert!(stderr.contains("does not exist"));
            }
            other => panic!("expected subprocess failure, got {:?}", other),
        }
        assert_eq!(fs::read_dir(store.kind_dir(ArtifactKind::Logical))?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_silent_success_is_a_failure() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(&tmp.path().join("store"));
        config.tools.pg_dump = Some(write_script(tmp.path(), "pg_dump", "exit 0")?);
        let store = ArtifactStore::new(&config.store_root);
        store.ensure_writable()?;

        let result = create_logical_backup(&config, &store, Some("orders"), &stamp());
        assert!(matches!(result, Err(AppError::Backup(_))));
        assert_eq!(fs::read_dir(store.kind_dir(ArtifactKind::Logical))?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_same_second_run_does_not_overwrite() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(&tmp.path().join("store"));
        config.tools.pg_dump = Some(write_script(tmp.path(), "pg_dump", "echo 'SET x = 1;'")?);
        let store = ArtifactStore::new(&config.store_root);
        store.ensure_writable()?;

        create_logical_backup(&config, &store, Some("orders"), &stamp())?;
        let second = create_logical_backup(&config, &store, Some("orders"), &stamp());
        assert!(matches!(second, Err(AppError::Backup(msg)) if msg.contains("already exists")));
        Ok(())
    }

    #[test]
    fn test_non_executable_tool_is_config_error() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(&tmp.path().join("store"));
        let plain = tmp.path().join("pg_dump");
        fs::write(&plain, "not executable")?;
        config.tools.pg_dump = Some(plain);
        let store = ArtifactStore::new(&config.store_root);
        store.ensure_writable()?;

        let result = create_logical_backup(&config, &store, Some("orders"), &stamp());
        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(fs::read_dir(store.kind_dir(ArtifactKind::Logical))?.count(), 0);
        Ok(())
    }
}
