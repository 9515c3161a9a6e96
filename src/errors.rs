use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("{tool} exited with {status}: {stderr}")]
    Subprocess {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Backup operation failed: {0}")]
    Backup(String),

    #[error("Validation failed for {location}: {hard_errors} hard error(s)")]
    ValidationFailed {
        location: String,
        hard_errors: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::Connectivity(_) => 3,
            AppError::ValidationFailed { .. } => 4,
            AppError::Subprocess { .. }
            | AppError::Backup(_)
            | AppError::Io(_)
            | AppError::SerdeJson(_)
            | AppError::Anyhow(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
