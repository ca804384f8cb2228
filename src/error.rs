//! Error taxonomy shared across the crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JournalError>;

/// Errors surfaced by the journal core
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("entry {0} is locked by another writer")]
    ConcurrentModification(i64),

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("projection inconsistency on entry {entry_id}: {detail}")]
    ProjectionInconsistency { entry_id: i64, detail: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid decimal in column {column}: {value}")]
    DecimalColumn { column: &'static str, value: String },

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl JournalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        JournalError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: i64) -> Self {
        JournalError::NotFound { kind, id }
    }
}
