//! Error types for the scheduler core.

/// Top-level error type for the scheduler.
///
/// Only construction is fallible. Submissions after shutdown are silent
/// no-ops, and callback failures are logged rather than propagated.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Configuration validation or parse error.
    #[error("config error: {0}")]
    Config(String),

    /// Thread creation failure.
    #[error("thread spawn error: {0}")]
    Spawn(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SchedulerError>;
