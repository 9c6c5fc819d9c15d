//! Interfaces of the collaborators the dispatch pipeline consumes.
//!
//! Content storage, subscriber storage and the mail transport are owned by
//! other subsystems. The pipeline only talks to them through these traits,
//! which lets the in-memory implementations in [`crate::memory`] stand in
//! for them in tests and dry runs.

use async_trait::async_trait;

use crate::{
    Issue, IssueId, IssueStatus, Language, Newsletter, NewsletterId, OutboundMessage, StoreError,
    Subscriber, SubscriptionStatus, TransportError,
};

/// Access to issues and newsletter definitions
#[async_trait]
pub trait EntityStore: Send + Sync + std::fmt::Debug {
    /// Load an issue, `None` if it no longer exists
    async fn load_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError>;

    /// Load a newsletter definition, `None` if it no longer exists
    async fn load_newsletter(&self, id: NewsletterId) -> Result<Option<Newsletter>, StoreError>;

    /// Write back the derived send status of an issue
    async fn set_issue_status(&self, id: IssueId, status: IssueStatus) -> Result<(), StoreError>;

    /// Add to the number of messages sent for an issue
    async fn add_sent_count(&self, id: IssueId, sent: u64) -> Result<(), StoreError>;

    /// Reset the sent counter when an issue is queued again
    async fn reset_sent_count(&self, id: IssueId) -> Result<(), StoreError>;
}

/// Criteria for selecting subscribers of a newsletter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberQuery {
    pub newsletter_id: NewsletterId,
    pub status: Option<SubscriptionStatus>,
    pub active: Option<bool>,
    pub language: Option<Language>,
}

impl SubscriberQuery {
    /// Active subscribers with a confirmed subscription to `newsletter_id`
    #[must_use]
    pub const fn active_subscribers(newsletter_id: NewsletterId) -> Self {
        Self {
            newsletter_id,
            status: Some(SubscriptionStatus::Subscribed),
            active: Some(true),
            language: None,
        }
    }

    #[must_use]
    pub fn matches(&self, subscriber: &Subscriber) -> bool {
        let Some(subscription) = subscriber.subscription(self.newsletter_id) else {
            return false;
        };

        self.status.is_none_or(|status| subscription.status == status)
            && self.active.is_none_or(|active| subscriber.active == active)
            && self
                .language
                .as_ref()
                .is_none_or(|language| subscriber.language == *language)
    }
}

/// Access to subscriber records
#[async_trait]
pub trait SubscriberStore: Send + Sync + std::fmt::Debug {
    /// Look a subscriber up by address
    async fn load_by_email(&self, mail: &str) -> Result<Option<Subscriber>, StoreError>;

    /// All subscribers matching the query, ordered by id
    async fn find(&self, query: &SubscriberQuery) -> Result<Vec<Subscriber>, StoreError>;

    /// Number of subscribers matching the query, without loading them
    async fn count(&self, query: &SubscriberQuery) -> Result<usize, StoreError>;
}

/// The outbound mail transport
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Hand a message off for delivery
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the message was not accepted
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}
