use thiserror::Error;

/// Errors from a backfill run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackfillError {
    /// The backfill program could not be started
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The program exited unsuccessfully
    #[error("backfill exited with {status}")]
    Failed { status: String, code: Option<i32> },

    /// Waiting on the child process failed
    #[error("backfill I/O error: {0}")]
    Io(String),

    /// The task driving the run was cancelled or panicked
    #[error("backfill task aborted: {0}")]
    Aborted(String),
}
