//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by an atomic store backend.
///
/// None of these ever mean "probably succeeded". A caller that receives one
/// must treat the outcome of the operation as unknown.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the round trip did not complete.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected a command or script.
    #[error("Store command failed: {0}")]
    Command(String),

    /// The store returned data that could not be decoded.
    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    /// Invalid store configuration.
    #[error("Store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a command error.
    pub fn command<S: Into<String>>(msg: S) -> Self {
        Self::Command(msg.into())
    }

    /// Create a corrupt data error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if the store was unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_classified() {
        let err = StoreError::unavailable("connection refused");
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_command_is_not_unavailable() {
        assert!(!StoreError::command("NOSCRIPT").is_unavailable());
        assert!(!StoreError::corrupt("bad status").is_unavailable());
    }

    #[test]
    fn test_json_error_maps_to_corrupt() {
        let err: StoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
