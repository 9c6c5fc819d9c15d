//! Error types for the bulletin-source crate.

use bulletin_common::{IssueId, NewsletterId, StoreError, TokenError};
use thiserror::Error;

/// Errors raised while resolving recipients or rendering a message
#[derive(Debug, Error)]
pub enum SourceError {
    /// The issue no longer exists.
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    /// The newsletter the issue belongs to no longer exists.
    #[error("Newsletter not found: {0}")]
    NewsletterNotFound(NewsletterId),

    /// No subscriber record for the row's address.
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// A strategy name that is not registered.
    #[error("Unknown {kind} strategy: {name}")]
    UnknownStrategy { kind: &'static str, name: String },

    /// HTML reduction or link signing failed.
    #[error("Render error: {0}")]
    Render(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SourceError {
    /// Whether the failure means the row can never be delivered, as opposed to
    /// a storage fault that may clear up
    #[must_use]
    pub const fn is_missing_entity(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound(_) | Self::NewsletterNotFound(_) | Self::SubscriberNotFound(_)
        )
    }
}

/// Specialized `Result` type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entity_classification() {
        assert!(SourceError::IssueNotFound(IssueId(1)).is_missing_entity());
        assert!(SourceError::SubscriberNotFound("a@b.c".to_string()).is_missing_entity());
        assert!(!SourceError::Render("bad".to_string()).is_missing_entity());
        assert!(
            !SourceError::Store(StoreError::Unavailable("db".to_string())).is_missing_entity()
        );
    }

    #[test]
    fn test_unknown_strategy_display() {
        let err = SourceError::UnknownStrategy {
            kind: "message source",
            name: "segment".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown message source strategy: segment");
    }
}
