//! Error types for InfraCalendar.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A schema-change unit failed; the runner halts and startup must abort.
    #[error("Migration {filename} failed: {reason}")]
    Migration { filename: String, reason: String },

    /// Schema integrity violation (e.g. an event referencing a missing page).
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The database stayed locked by another writer past the retry budget.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown extractor version: {0}")]
    UnknownExtractor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must halt the process rather than be handled locally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Migration { .. } | Self::Integrity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
