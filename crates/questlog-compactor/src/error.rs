//! Startup and run errors for the compactor.

use questlog_core::error::DomainError;
use thiserror::Error;

/// Errors that abort a compactor run.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Compaction or pruning failed.
    #[error("compaction error: {0}")]
    Domain(#[from] DomainError),
}

impl AppError {
    /// Process exit code for this error: 2 for bad configuration, 1 for
    /// everything else.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}
