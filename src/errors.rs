//! Error types for the webnotes store.
//!
//! Expected outcomes such as a missing note are not errors: the store reports them
//! through `Option`, `bool` or a count. Everything here is an unexpected failure or a
//! rejected input.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the webnotes crate.
#[derive(Error, Debug)]
pub enum NotesError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization of the notes document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors reported by the PostgreSQL backend.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input rejected by the boundary checks.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// The in-memory document lock was poisoned by a panicking writer.
    #[error("{message}")]
    LockPoisoned { message: String },

    /// The background flush task could not be reached or failed.
    #[error("Flush failed: {message}")]
    FlushFailed { message: String },
}

impl NotesError {
    /// Shorthand for building a validation error.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        NotesError::Validation {
            field,
            message: message.into(),
        }
    }
}
