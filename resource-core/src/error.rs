/*!
Error types for resource entities.
*/

use thiserror::Error;

/// Result type used throughout the resource core.
pub type Result<T> = std::result::Result<T, ResourceError>;

/// Errors that can occur while building, saving or loading resource entities.
///
/// Saving a readonly entity is deliberately absent: it is a logged no-op,
/// not a failure.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The entity name normalized to an empty key
    #[error("Invalid resource identity: {0:?} does not produce a usable key")]
    InvalidIdentity(String),

    /// A record was offered to an entity with a different name
    #[error("Resource name mismatch: expected {expected}, found {found}")]
    NameMismatch { expected: String, found: String },

    /// The payload could not be serialized for hashing or export
    #[error("Unable to export the {name} data store: {source}")]
    Export {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// The payload no longer matches the hash it was saved with
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// The file is not a resource file
    #[error("Invalid resource format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Logging or metrics setup failed
    #[error("Observability error: {0}")]
    Observability(String),
}

impl ResourceError {
    /// Create a new export error wrapping the codec failure
    pub fn export<S: Into<String>>(name: S, source: serde_json::Error) -> Self {
        Self::Export {
            name: name.into(),
            source,
        }
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }
}
