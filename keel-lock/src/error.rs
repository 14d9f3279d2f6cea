//! Lease lock errors

use keel_core::StoreError;
use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Lease lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock '{0}' is held by another owner")]
    Contended(String),

    #[error("Lease TTL must be at least one millisecond")]
    InvalidTtl,

    #[error("Lock store error: {0}")]
    Store(#[from] StoreError),
}

impl LockError {
    /// Check if another owner holds the lock
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contended_names_the_lock() {
        let err = LockError::Contended("nightly-report".to_string());
        assert!(err.is_contended());
        assert_eq!(
            err.to_string(),
            "Lock 'nightly-report' is held by another owner"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: LockError = StoreError::unavailable("timed out").into();
        assert!(matches!(err, LockError::Store(ref e) if e.is_unavailable()));
        assert!(!err.is_contended());
    }
}
