//! State backend error types.

/// Errors produced by [`StateBackend`](crate::StateBackend) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,

    /// A run in a terminal state was asked to finalize again.
    #[error("run {run_id} is already finalized")]
    AlreadyFinalized { run_id: i64 },
}

impl StateError {
    /// Wrap a `SQLite` error.
    #[must_use]
    pub fn backend(err: rusqlite::Error) -> Self {
        Self::Backend {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Wrap a `SQLite` error with the operation that hit it.
    #[must_use]
    pub fn backend_context(context: &str, err: rusqlite::Error) -> Self {
        Self::Backend {
            message: format!("{context}: {err}"),
            source: Some(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
