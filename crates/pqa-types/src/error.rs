// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all kernel failures.
///
/// Malformed subtask ranges and mismatched buffer lengths are programming
/// defects and are asserted instead of being reported through this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PqaError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Invalid input (ids out of range, malformed knowledge base).
    #[error("validation error: {0}")]
    Validation(String),

    /// Numerical error (zero or non-finite sum, NaN/Inf in computation).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// A subtask returned an error or panicked on a worker thread.
    #[error("subtask on worker {worker} failed: {message}")]
    SubtaskFailed { worker: usize, message: String },

    /// Work was submitted to a pool whose workers have exited.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),
}

pub type PqaResult<T> = Result<T, PqaError>;
