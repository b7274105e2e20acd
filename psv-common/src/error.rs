//! Common error types for the survey core
//!
//! Per-request failures (`Validation`, `Persistence`, `InvalidAction`) are
//! recoverable: the controller reports them and leaves session state untouched.
//! `Catalog` and `Config` are startup failures.

use thiserror::Error;

/// Common result type for survey operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the core and the HTTP layer
#[derive(Error, Debug)]
pub enum Error {
    /// Storage root unreadable or misconfigured
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Malformed judgment (re-prompt the same item)
    #[error("Invalid judgment: {0}")]
    Validation(String),

    /// Response log write or read failed (cursor not advanced)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Action not legal for the participant's current state
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Advance requested past the end of the item sequence
    #[error("Cursor out of range: {cursor} of {total}")]
    OutOfRange { cursor: usize, total: usize },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Catalog(_) => "catalog",
            Error::Validation(_) => "validation",
            Error::Persistence(_) => "persistence",
            Error::InvalidAction(_) => "invalid_action",
            Error::OutOfRange { .. } => "out_of_range",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io",
        }
    }

    /// Whether the participant can retry the same item after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Persistence(_) | Error::InvalidAction(_)
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}
