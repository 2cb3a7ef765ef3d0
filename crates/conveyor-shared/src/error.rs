//! # Domain Error Types
//!
//! Unified error handling for the orchestrator core. Every fallible
//! operation in `conveyor-shared` and `conveyor-orchestration` returns
//! `ConveyorResult<T>`; transport adapters translate these into HTTP
//! status codes or queue-retry decisions via [`ConveyorError::is_recoverable`].

use thiserror::Error;

/// Crate-wide result alias.
pub type ConveyorResult<T> = Result<T, ConveyorError>;

/// Domain error kinds for the preprocessing orchestrator core.
#[derive(Debug, Error)]
pub enum ConveyorError {
    /// A batch message could not be accepted before any state was recorded.
    /// The caller (queue consumer) should let the queue substrate retry.
    #[error("queue delivery failed for batch {batch_id}: {reason}")]
    QueueDeliveryError { batch_id: String, reason: String },

    /// The remote machine API rejected or could not be reached for a spawn
    /// request. Leaves the task pending; counted as orchestrator no-progress.
    #[error("spawn request for task {task_id} failed transiently: {reason}")]
    SpawnTransientError { task_id: String, reason: String },

    /// The remote machine API rejected a spawn request in a way that will
    /// never succeed on retry (malformed request, unauthorized, etc).
    #[error("spawn request for task {task_id} failed permanently: {reason}")]
    SpawnPermanentError { task_id: String, reason: String },

    /// A worker reported a terminal failure for its task via callback.
    #[error("worker reported error for task {task_id}: {reason}")]
    WorkerReportedError { task_id: String, reason: String },

    /// An inbound callback body or path could not be parsed.
    #[error("malformed callback for batch {batch_id}: {reason}")]
    CallbackMalformed { batch_id: String, reason: String },

    /// A core invariant was violated; the owning batch is marked `ERROR`.
    #[error("internal invariant violated for batch {batch_id}: {reason}")]
    InternalInvariantViolation { batch_id: String, reason: String },

    /// The batch was forced into a terminal failure via the admin API.
    #[error("batch {batch_id} reset by admin")]
    AdminReset { batch_id: String },

    /// The referenced batch id has no known state.
    #[error("batch {batch_id} not found")]
    BatchNotFound { batch_id: String },

    /// Configuration failed validation at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(String),
}

impl ConveyorError {
    /// Whether the condition is worth retrying rather than treating as fatal.
    ///
    /// Used by the alarm loop and transport adapters to decide between
    /// "leave pending and retry later" and "transition the batch to `ERROR`".
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConveyorError::QueueDeliveryError { .. } => true,
            ConveyorError::SpawnTransientError { .. } => true,
            ConveyorError::SpawnPermanentError { .. } => true,
            ConveyorError::WorkerReportedError { .. } => true,
            ConveyorError::CallbackMalformed { .. } => false,
            ConveyorError::InternalInvariantViolation { .. } => false,
            ConveyorError::AdminReset { .. } => false,
            ConveyorError::BatchNotFound { .. } => false,
            ConveyorError::Configuration(_) => false,
            ConveyorError::Database(e) => {
                matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
            }
            ConveyorError::Http(e) => e.is_timeout() || e.is_connect(),
            ConveyorError::Serialization(_) => false,
            ConveyorError::Queue(_) => true,
        }
    }

    pub fn spawn_transient(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnTransientError {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_permanent(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnPermanentError {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn callback_malformed(batch_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallbackMalformed {
            batch_id: batch_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant_violation(batch_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InternalInvariantViolation {
            batch_id: batch_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_transient_is_recoverable() {
        let err = ConveyorError::spawn_transient("t1", "connection refused");
        assert!(err.is_recoverable());
    }

    #[test]
    fn callback_malformed_is_not_recoverable() {
        let err = ConveyorError::callback_malformed("b1", "invalid json");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn invariant_violation_is_not_recoverable() {
        let err = ConveyorError::invariant_violation("b1", "tasks_completed > tasks_total");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn admin_reset_is_not_recoverable() {
        let err = ConveyorError::AdminReset {
            batch_id: "b1".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn display_batch_not_found() {
        let err = ConveyorError::BatchNotFound {
            batch_id: "b1".to_string(),
        };
        assert_eq!(format!("{err}"), "batch b1 not found");
    }

    #[test]
    fn serialization_error_not_recoverable() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: ConveyorError = json_err.into();
        assert!(!err.is_recoverable());
    }
}
