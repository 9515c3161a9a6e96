// Preflight checks run before any artifact work
use postgres::NoTls;
use std::time::Duration;
use tracing::info;

use super::pgpass::lookup_password;
use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::{AppError, Result};
use crate::store::ArtifactStore;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub trait ConnectivityProbe {
    fn check(&self, database: &DatabaseConfig) -> Result<()>;
}

/// Runs `SELECT 1` against the probe database.
#[derive(Debug, Clone)]
pub struct PostgresProbe {
    pub timeout: Duration,
}

impl Default for PostgresProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl ConnectivityProbe for PostgresProbe {
    fn check(&self, database: &DatabaseConfig) -> Result<()> {
        check_db_connection(database, self.timeout)
    }
}

pub fn check_db_connection(database: &DatabaseConfig, timeout: Duration) -> Result<()> {
    let host = database.require_host()?;
    let target = format!(
        "{}@{}:{}/{}",
        database.user, host, database.port, database.probe_dbname
    );

    let mut pg_config = postgres::Config::new();
    pg_config
        .host(host)
        .port(database.port)
        .user(&database.user)
        .dbname(&database.probe_dbname)
        .connect_timeout(timeout);
    if let Some(passfile) = &database.passfile {
        if let Some(password) = lookup_password(
            passfile,
            host,
            database.port,
            &database.probe_dbname,
            &database.user,
        ) {
            pg_config.password(password);
        }
    }

    let mut client = pg_config
        .connect(NoTls)
        .map_err(|e| AppError::Connectivity(format!("Failed to connect to {}: {}", target, e)))?;
    client
        .simple_query("SELECT 1")
        .map_err(|e| AppError::Connectivity(format!("Probe query against {} failed: {}", target, e)))?;

    info!("✅ Successfully connected to {}", target);
    Ok(())
}

/// Required parameters, connectivity, then store writability. Nothing is
/// created in the store unless the database answered.
pub fn preflight(config: &AppConfig, store: &ArtifactStore, probe: &dyn ConnectivityProbe) -> Result<()> {
    let host = config.database.require_host()?;
    info!(
        "🛠 Preflight: {}@{}:{}, store {}",
        config.database.user,
        host,
        config.database.port,
        store.root().display()
    );
    probe.check(&config.database)?;
    store.ensure_writable()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubProbe, test_config};

    #[test]
    fn test_preflight_requires_host() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut config = test_config(tmp.path());
        config.database.host = None;
        let store = ArtifactStore::new(&config.store_root);

        let result = preflight(&config, &store, &StubProbe::reachable());
        assert!(matches!(result, Err(AppError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_failed_probe_leaves_store_untouched() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let config = test_config(&tmp.path().join("store"));
        let store = ArtifactStore::new(&config.store_root);

        let result = preflight(&config, &store, &StubProbe::unreachable());
        assert!(matches!(result, Err(AppError::Connectivity(_))));
        assert!(!config.store_root.exists());
        Ok(())
    }

    #[test]
    fn test_successful_preflight_prepares_store() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let config = test_config(&tmp.path().join("store"));
        let store = ArtifactStore::new(&config.store_root);

        preflight(&config, &store, &StubProbe::reachable())?;
        assert!(config.store_root.join("logical").is_dir());
        assert!(config.store_root.join("physical").is_dir());
        Ok(())
    }

    #[test]
    fn test_unreachable_server_is_connectivity_error() {
        let database = DatabaseConfig {
            host: Some("127.0.0.1".to_string()),
            port: 1,
            user: "postgres".to_string(),
            probe_dbname: "postgres".to_string(),
            passfile: None,
        };
        let result = check_db_connection(&database, Duration::from_secs(2));
        assert!(matches!(result, Err(AppError::Connectivity(_))));
    }
}
