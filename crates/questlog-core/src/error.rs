//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No events exist for the aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict: another writer already appended at
    /// the expected version.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// The event history cannot be folded into a valid aggregate.
    #[error("corrupt aggregate {aggregate_id}: {reason}")]
    CorruptAggregate {
        /// The aggregate whose history is unusable.
        aggregate_id: Uuid,
        /// What was wrong with it.
        reason: String,
    },

    /// The storage layer could not be reached or failed mid-operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An event handler failed. Only ever logged by the dispatcher.
    #[error("handler {handler} failed: {reason}")]
    HandlerFailure {
        /// Name of the failing handler.
        handler: String,
        /// The handler's error message.
        reason: String,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// State or payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Returns `true` when retrying the operation may succeed: after a reload
    /// for concurrency conflicts, after a backoff for storage errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::StorageUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_and_storage_errors_are_retryable() {
        let conflict = DomainError::ConcurrencyConflict {
            aggregate_id: Uuid::new_v4(),
            expected: 3,
            actual: 4,
        };
        assert!(conflict.is_retryable());
        assert!(DomainError::StorageUnavailable("timeout".into()).is_retryable());
    }

    #[test]
    fn test_corrupt_aggregate_is_not_retryable() {
        let err = DomainError::CorruptAggregate {
            aggregate_id: Uuid::new_v4(),
            reason: "missing creation event".into(),
        };
        assert!(!err.is_retryable());
        assert!(!DomainError::AggregateNotFound(Uuid::new_v4()).is_retryable());
    }

    #[test]
    fn test_conflict_message_names_both_versions() {
        let aggregate_id = Uuid::new_v4();
        let err = DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: 3,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            format!("concurrency conflict on aggregate {aggregate_id}: expected version 3, found 4")
        );
    }
}
