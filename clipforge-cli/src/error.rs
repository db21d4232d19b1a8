use std::path::PathBuf;

use clipforge::ClientError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("failed to read config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("interrupted")]
    Interrupted,
}

impl AppError {
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            Self::InvalidInput(_) | Self::Config { .. } => 2,
            _ => 1,
        }
    }
}
