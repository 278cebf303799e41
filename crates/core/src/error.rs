//! Error types for the vsctl CLI.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! vendor API failures and the fatal outcomes of the index-overwrite
//! protocol. Non-fatal outcomes (orphaned blobs, failed handle rebinds) are
//! not errors; they are reported as warnings by the store crate.

use thiserror::Error;

/// Unified error type for vsctl.
///
/// All fallible functions return `Result<T, AppError>`. Fatal overwrite
/// errors carry enough detail for the operator to tell whether remote state
/// was left inconsistent.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The vendor rejected the credential, or none was supplied
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The referenced index does not exist (or no longer exists)
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// More than one index carries the requested name
    #[error("Index name '{name}' is ambiguous: {count} indexes share it, select one by id")]
    AmbiguousIndexName { name: String, count: usize },

    /// The vendor refused to delete the index being overwritten.
    #[error(
        "Failed to delete index {index_id}: {reason}. The index still exists; \
         documents detached before this point have been removed"
    )]
    IndexDeletionFailed { index_id: String, reason: String },

    /// The index was deleted but could not be recreated.
    #[error(
        "Failed to recreate index '{name}' after deleting {previous_index_id}: {reason}. \
         The index NO LONGER EXISTS; re-run overwrite to recreate it"
    )]
    IndexCreationFailed {
        name: String,
        previous_index_id: String,
        reason: String,
    },

    /// Content reached the vendor but was not indexed. The index exists and is empty.
    #[error(
        "Ingestion into index {index_id} failed: {reason}. The index exists but is empty; \
         retry the upload"
    )]
    IngestionFailed { index_id: String, reason: String },

    /// The managed conversational flow ended in a non-success state
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transport or vendor-side errors that fit no more specific kind
    #[error("API error: {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Spreadsheet parsing errors
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// The operator cancelled a running operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build an API error from an optional HTTP status and a message.
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Api { status, .. } => *status,
            AppError::IndexNotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Whether the error means the addressed remote object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::IndexNotFound(_)) || self.status() == Some(404)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
