//! Mapping of `sqlx` failures onto domain errors.

use questlog_core::error::DomainError;

/// Wraps any database failure as a transient storage error.
#[allow(clippy::needless_pass_by_value)]
pub(crate) fn storage_error(err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, "database operation failed");
    DomainError::StorageUnavailable(err.to_string())
}

/// Returns `true` if `err` is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Converts a database count or size to `u64`, clamping negatives to zero.
pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
