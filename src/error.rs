//! rescache error types

/// rescache error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    // Configuration errors
    /// A key argument named by a schema or invalidation is not bound by the
    /// call site. Always fatal: retrying cannot fix a wiring mistake.
    #[error("missing argument '{argument}' for schema '{schema}'")]
    MissingArgument { argument: String, schema: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    /// Value could not be encoded or a stored entry could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    // Backend errors
    /// The key/value store failed or did not answer within the operation
    /// timeout.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CacheError {
    /// Whether the error came from the backing store (including timeouts).
    pub fn is_store_failure(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }

    /// Whether the error came from encoding or decoding a value.
    pub fn is_serialization(&self) -> bool {
        matches!(self, CacheError::Serialization(_))
    }

    /// Re-label any error as a store failure, keeping its message.
    pub(crate) fn into_store_failure(self) -> Self {
        match self {
            err @ CacheError::StoreUnavailable(_) => err,
            other => CacheError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type alias for rescache operations
pub type Result<T> = std::result::Result<T, CacheError>;
