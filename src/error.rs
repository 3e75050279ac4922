//! Error types shared across the crate.

use thiserror::Error as ThisError;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// A terminal failure to fetch a page of market history.
///
/// These are carried inside `anyhow::Error` by the sync engine, so callers that need to react to
/// a specific failure can `downcast_ref::<FetchError>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum FetchError {
    /// The server rejected the session cookies. Retrying will not help; new cookies are needed.
    #[error("Authentication failed ({status}). Your session cookies are likely expired")]
    AuthExpired { status: u16 },

    /// The server answered with a status that is neither success nor retryable.
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    /// Every attempt in the retry budget failed.
    #[error("Failed to fetch data after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The operator asked to stop.
    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns `true` for a user-requested stop, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
