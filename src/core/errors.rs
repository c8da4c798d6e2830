/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

/// Result type for synchronizer and executor operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the synchronizers and thread pools
///
/// Timeouts are deliberately absent: a timed-out wait is reported as an
/// empty result (`None` / `false`), never as an error.
///
/// User-supplied failures are shared behind an `Arc` so that one factory
/// error can be handed to every caller that observes it.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum SyncError {
    #[error("Value factory failed: {0}")]
    #[diagnostic(
        code(sync::factory_failed),
        help("The error is cached: every later retrieval observes it until the cell is reset.")
    )]
    FactoryFailed(Arc<anyhow::Error>),

    #[error("Task rejected: executor has been shut down")]
    #[diagnostic(
        code(executor::rejected),
        help("Submit work before calling shutdown(), or create a new pool.")
    )]
    Rejected,

    #[error("Task failed: {0}")]
    #[diagnostic(code(executor::task_failed))]
    TaskFailed(Arc<anyhow::Error>),

    #[error("Task panicked: {0}")]
    #[diagnostic(
        code(executor::task_panicked),
        help("The worker survived the panic; inspect the task for the cause.")
    )]
    TaskPanicked(String),

    #[error("Task was cancelled before it started")]
    #[diagnostic(code(executor::cancelled))]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(sync::invalid_config))]
    InvalidConfig(String),

    #[error("Failed to spawn thread: {0}")]
    #[diagnostic(
        code(executor::spawn_failed),
        help("The OS refused to create a thread. Check process thread limits.")
    )]
    SpawnFailed(String),
}

impl SyncError {
    /// Wrap a factory error for caching
    pub fn factory(err: anyhow::Error) -> Self {
        Self::FactoryFailed(Arc::new(err))
    }

    /// Wrap a task error for its completion handle
    pub fn task(err: anyhow::Error) -> Self {
        Self::TaskFailed(Arc::new(err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::SpawnFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_error_display() {
        let err = SyncError::factory(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "Value factory failed: disk on fire");
    }

    #[test]
    fn test_cloned_error_shares_source() {
        let err = SyncError::factory(anyhow::anyhow!("boom"));
        let clone = err.clone();

        match (err, clone) {
            (SyncError::FactoryFailed(a), SyncError::FactoryFailed(b)) => {
                assert!(Arc::ptr_eq(&a, &b));
            }
            _ => panic!("expected factory errors"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "too many threads");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::SpawnFailed(msg) if msg.contains("too many threads")));
    }
}
