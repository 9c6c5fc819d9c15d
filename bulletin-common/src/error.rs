//! Error types for the collaborator interfaces.
//!
//! These are the failures the dispatch pipeline can observe from the systems
//! it does not own: the content/subscriber storage, the mail transport and
//! the token replacement engine.

use thiserror::Error;

/// Errors raised by the content or subscriber storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be reached or queried.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A write was attempted against a record that does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the mail transport when handing a message off.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused the message (bad address, policy, ...).
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The transport could not be reached.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while substituting tokens into a template.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The template could not be rendered.
    #[error("Token replacement failed: {0}")]
    Render(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound("issue 4".to_string());
        assert_eq!(err.to_string(), "Record not found: issue 4");

        let err = TransportError::Rejected("550 no such user".to_string());
        assert_eq!(err.to_string(), "Message rejected: 550 no such user");
    }
}
