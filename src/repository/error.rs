//! Repository Errors
//!
//! Error types for order persistence.

use std::time::Duration;

/// Errors that can occur in the order repository
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// An order with this uid is already stored
    #[error("Order already exists: {order_uid}")]
    AlreadyExists { order_uid: String },

    /// Database error
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The operation outlived the caller's deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// An order row exists without its owned rows
    #[error("Inconsistent aggregate for order {order_uid}: {reason}")]
    Inconsistent { order_uid: String, reason: String },

    /// The database refused the data itself; storing it again fails the same way
    #[error("Order {order_uid} rejected by the database: {reason}")]
    Rejected { order_uid: String, reason: String },
}

impl RepositoryError {
    /// Check if this error is a duplicate-key conflict
    pub fn is_already_exists(&self) -> bool {
        matches!(self, RepositoryError::AlreadyExists { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RepositoryError::AlreadyExists { .. } | RepositoryError::Rejected { .. }
        )
    }
}
