//! Common error types for StemDeck

use thiserror::Error;

/// Common result type for StemDeck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the catalog and configuration layers
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A catalog record already references this stems directory
    #[error("Duplicate stems path: {0}")]
    DuplicatePath(String),
}

impl Error {
    /// True for the NotFound variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
