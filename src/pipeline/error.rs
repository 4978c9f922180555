//! Pipeline error taxonomy.
//!
//! Workers report `WorkerError`; the executor translates everything below it
//! into `PipelineError` before it reaches the run state store or a client.

use thiserror::Error;

use crate::db::DatabaseError;

/// Failure reported by a stage worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Transient: timeouts, short I/O failures. The executor retries these
    /// with bounded backoff.
    #[error("{0}")]
    Retryable(String),

    /// Permanent for this input. The run fails and must be resumed.
    #[error("{0}")]
    Fatal(String),
}

impl From<DatabaseError> for WorkerError {
    fn from(err: DatabaseError) -> Self {
        // Worker-side persistence failures are worth one retry round before
        // the run is failed.
        WorkerError::Retryable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stage '{0}' is not a valid resume target")]
    InvalidStage(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{unresolved} entity conflict(s) must be confirmed first")]
    ConflictsPending { unresolved: u32 },

    #[error("Run is being executed by '{holder}'")]
    LeaseConflict { holder: String },

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for PipelineError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                PipelineError::NotFound(format!("{entity_type} {id}"))
            }
            other => PipelineError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_not_found_becomes_pipeline_not_found() {
        let err: PipelineError = DatabaseError::NotFound {
            entity_type: "run".to_string(),
            id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn other_database_errors_stay_database() {
        let err: PipelineError =
            DatabaseError::ConstraintViolation("oops".to_string()).into();
        assert!(matches!(err, PipelineError::Database(_)));
    }

    #[test]
    fn conflict_message_carries_count() {
        let err = PipelineError::ConflictsPending { unresolved: 3 };
        assert!(err.to_string().contains('3'));
    }
}
