//! Typed error handling for dispatch operations.
//!
//! Per-row failures during a tick are recorded on the row and never returned
//! from `run_tick`. These errors surface from operations that act on a whole
//! issue (queueing, test sends) and from store-level faults.

use bulletin_common::{IssueId, NewsletterId, StoreError, TransportError};
use bulletin_source::SourceError;
use bulletin_spool::SpoolError;
use thiserror::Error;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Failure that retrying will not fix (missing entity, bad request).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// The mail transport refused or could not take the message.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Storage or configuration problem.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Failures that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    #[error("Newsletter not found: {0}")]
    NewsletterNotFound(NewsletterId),

    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// The message could not be rendered.
    #[error("Render failed: {0}")]
    Render(String),

    #[error("No test recipients given")]
    NoTestRecipients,

    #[error("Too many test recipients: {count} (max {max})")]
    TooManyTestRecipients { count: usize, max: usize },
}

/// Internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Invalid dispatch configuration, reported when it is loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown message source '{name}' for content type '{content_type}'")]
    UnknownSource { content_type: String, name: String },

    #[error("Unknown recipient handler '{name}' for newsletter {newsletter}")]
    UnknownResolver {
        newsletter: NewsletterId,
        name: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl DeliveryError {
    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if the transport failed.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if this is a system error.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl From<SpoolError> for DeliveryError {
    fn from(error: SpoolError) -> Self {
        Self::System(SystemError::Spool(error))
    }
}

impl From<StoreError> for DeliveryError {
    fn from(error: StoreError) -> Self {
        Self::System(SystemError::Store(error))
    }
}

impl From<ConfigError> for DeliveryError {
    fn from(error: ConfigError) -> Self {
        Self::System(SystemError::Configuration(error))
    }
}

/// Missing entities are permanent, storage faults are system errors, and
/// anything else went wrong while rendering.
impl From<SourceError> for DeliveryError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::IssueNotFound(id) => Self::Permanent(PermanentError::IssueNotFound(id)),
            SourceError::NewsletterNotFound(id) => {
                Self::Permanent(PermanentError::NewsletterNotFound(id))
            }
            SourceError::SubscriberNotFound(mail) => {
                Self::Permanent(PermanentError::SubscriberNotFound(mail))
            }
            SourceError::Store(e) => Self::System(SystemError::Store(e)),
            SourceError::UnknownStrategy { kind, name } => {
                Self::System(SystemError::Internal(format!("Unknown {kind} strategy: {name}")))
            }
            e @ (SourceError::Render(_) | SourceError::Token(_)) => {
                Self::Permanent(PermanentError::Render(e.to_string()))
            }
        }
    }
}

/// Specialized `Result` type for dispatch operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
