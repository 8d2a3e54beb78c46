//! Error types for the stow engine.

use thiserror::Error;

/// All possible errors from the stow engine.
///
/// Configuration and usage errors are raised synchronously at the point of
/// serialization (or before any request is built) and are never retried.
/// Malformed incoming data never shows up here: reconciliation logs a decode
/// warning and skips the offending field instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("invalid name '{0}': names must be 3-25 alphanumeric characters")]
    InvalidName(String),

    #[error("field '{field}' collides with the reserved id field of schema '{schema}'")]
    ReservedFieldName { schema: String, field: String },

    #[error("field '{0}' holds a nested object, which the object store cannot persist")]
    NestedObjectUnsupported(String),

    #[error("field '{0}' has an ambiguous array element type")]
    AmbiguousElementType(String),

    // Usage errors
    #[error("model type not registered: {0}")]
    UnknownModelType(String),

    #[error("unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("element type mismatch for field '{field}': expected {expected}, got {got}")]
    ElementTypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("model instance at '{0}' is already borrowed")]
    InstanceBorrowed(String),

    #[error("model '{0}' has no id; save it first")]
    MissingId(String),

    #[error("invalid geo point: lat {lat}, lon {lon}")]
    InvalidGeoPoint { lat: String, lon: String },

    // Transport-facing errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether this error stems from an invalid model definition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidName(_)
                | Error::ReservedFieldName { .. }
                | Error::NestedObjectUnsupported(_)
                | Error::AmbiguousElementType(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
