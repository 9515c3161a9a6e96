pub mod pgpass;
pub mod setting;

use std::path::{Path, PathBuf};
use which::which;

use crate::errors::{AppError, Result};

/// Finds a PostgreSQL client binary, preferring an explicitly configured path.
pub fn find_executable(name: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(AppError::Config(format!(
            "{} is configured as {} but no such file exists",
            name,
            path.display()
        ))),
        None => which(name).map_err(|_| {
            AppError::Config(format!(
                "{} executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.",
                name
            ))
        }),
    }
}
