//! Schema-fetching error type.

use thiserror::Error;

/// Errors returned by a [`crate::SchemaFetcher`].
///
/// Compilation never fails because of these: a schema that cannot be fetched
/// is replaced by the empty schema `{}` and a warning is logged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// No schema is known under this URI.
    #[error("schema '{0}' not found")]
    NotFound(String),

    /// The schema source could not be read.
    #[error("failed to read schema '{uri}': {message}")]
    Io { uri: String, message: String },

    /// The schema source is not valid JSON.
    #[error("schema '{uri}' is not valid JSON: {message}")]
    Parse { uri: String, message: String },
}
