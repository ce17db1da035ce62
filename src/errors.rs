//! Error types shared across the verification engine and server.

use thiserror::Error;

/// Unified error type for engine and server operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A database operation failed.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// A cryptographic operation failed (signing, key decoding, encryption).
    #[error("crypto error: {0}")]
    CryptoError(String),

    /// The geolocation collaborator could not be constructed.
    #[error("geolocation error: {0}")]
    GeoError(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = EngineError::DatabaseError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        let err = EngineError::ConfigError("bad port".to_string());
        assert!(err.to_string().starts_with("configuration error"));
    }
}
