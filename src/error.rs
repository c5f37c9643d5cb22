//! Error taxonomy for the orchestration engine.
//!
//! Only `InvalidRequest`, `DuplicateSession` and `RunFailed` ever reach the
//! caller of a run. The remaining variants are recovered locally and end up
//! as log lines, session errors or degraded phase outputs.

use thiserror::Error;

/// Errors raised by the orchestrator and its components.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A session with the same id is still running.
    #[error("session '{0}' is already running")]
    DuplicateSession(String),

    /// Request parameters failed validation before any phase ran.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The collaborator was absent at registration time.
    #[error("collaborator '{0}' is unavailable")]
    CollaboratorUnavailable(String),

    /// A single candidate operation raised.
    #[error("operation '{collaborator}.{operation}' failed: {reason}")]
    OperationFailed {
        collaborator: String,
        operation: String,
        reason: String,
    },

    /// Unexpected error inside a phase's own logic.
    #[error("phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    /// An error escaped the whole pipeline.
    #[error("run failed: {0}")]
    RunFailed(String),
}
