//! In-memory collaborators.
//!
//! Stand-ins for the content store, subscriber store and mail transport,
//! used by tests across the workspace and by the binary's dry-run mode.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    EntityStore, Issue, IssueId, IssueStatus, MailTransport, Newsletter, NewsletterId,
    OutboundMessage, StoreError, Subscriber, SubscriberQuery, SubscriberStore, TransportError,
};

/// Issues and newsletters held in maps
#[derive(Debug, Clone, Default)]
pub struct MemoryEntityStore {
    issues: Arc<RwLock<BTreeMap<IssueId, Issue>>>,
    newsletters: Arc<RwLock<BTreeMap<NewsletterId, Newsletter>>>,
}

impl MemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an issue
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn insert_issue(&self, issue: Issue) -> Result<(), StoreError> {
        self.issues.write()?.insert(issue.id, issue);
        Ok(())
    }

    /// Insert or replace a newsletter
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn insert_newsletter(&self, newsletter: Newsletter) -> Result<(), StoreError> {
        self.newsletters.write()?.insert(newsletter.id, newsletter);
        Ok(())
    }

    /// Delete an issue, returning it if it existed
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn remove_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError> {
        Ok(self.issues.write()?.remove(&id))
    }

    /// Current state of an issue
    #[must_use]
    pub fn issue(&self, id: IssueId) -> Option<Issue> {
        self.issues
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn update_issue(&self, id: IssueId, f: impl FnOnce(&mut Issue)) -> Result<(), StoreError> {
        let mut issues = self.issues.write()?;
        let issue = issues
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        f(issue);
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn load_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError> {
        Ok(self.issues.read()?.get(&id).cloned())
    }

    async fn load_newsletter(&self, id: NewsletterId) -> Result<Option<Newsletter>, StoreError> {
        Ok(self.newsletters.read()?.get(&id).cloned())
    }

    async fn set_issue_status(&self, id: IssueId, status: IssueStatus) -> Result<(), StoreError> {
        self.update_issue(id, |issue| issue.status = status)
    }

    async fn add_sent_count(&self, id: IssueId, sent: u64) -> Result<(), StoreError> {
        self.update_issue(id, |issue| issue.sent_count += sent)
    }

    async fn reset_sent_count(&self, id: IssueId) -> Result<(), StoreError> {
        self.update_issue(id, |issue| issue.sent_count = 0)
    }
}

/// Subscribers held in a map keyed by id
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriberStore {
    subscribers: Arc<RwLock<BTreeMap<crate::SubscriberId, Subscriber>>>,
}

impl MemorySubscriberStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn insert(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        self.subscribers.write()?.insert(subscriber.id, subscriber);
        Ok(())
    }

    /// Delete the subscriber with the given address
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn remove_by_email(&self, mail: &str) -> Result<Option<Subscriber>, StoreError> {
        let mut subscribers = self.subscribers.write()?;
        let id = subscribers
            .values()
            .find(|subscriber| subscriber.mail.eq_ignore_ascii_case(mail))
            .map(|subscriber| subscriber.id);
        Ok(id.and_then(|id| subscribers.remove(&id)))
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn load_by_email(&self, mail: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .read()?
            .values()
            .find(|subscriber| subscriber.mail.eq_ignore_ascii_case(mail))
            .cloned())
    }

    async fn find(&self, query: &SubscriberQuery) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .read()?
            .values()
            .filter(|subscriber| query.matches(subscriber))
            .cloned()
            .collect())
    }

    async fn count(&self, query: &SubscriberQuery) -> Result<usize, StoreError> {
        Ok(self
            .subscribers
            .read()?
            .values()
            .filter(|subscriber| query.matches(subscriber))
            .count())
    }
}

/// Transport that records every accepted message
///
/// Addresses registered with [`RecordingTransport::fail_for`] are rejected.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message addressed to `mail`
    pub fn fail_for(&self, mail: impl Into<String>) {
        self.failing.lock().insert(mail.into());
    }

    /// Accept messages to `mail` again
    pub fn recover(&self, mail: &str) {
        self.failing.lock().remove(mail);
    }

    /// Messages accepted so far
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Drop the recorded messages
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if self.failing.lock().contains(&message.to) {
            return Err(TransportError::Rejected(format!(
                "550 mailbox unavailable: {}",
                message.to
            )));
        }

        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IssueContent, SubscriberId};

    #[tokio::test]
    async fn test_entity_store_counters() {
        let store = MemoryEntityStore::new();
        store
            .insert_issue(Issue::new(
                IssueId(1),
                NewsletterId(1),
                IssueContent::default(),
            ))
            .expect("insert issue");

        store.add_sent_count(IssueId(1), 3).await.expect("add");
        store.add_sent_count(IssueId(1), 2).await.expect("add");
        assert_eq!(store.issue(IssueId(1)).map(|i| i.sent_count), Some(5));

        store.reset_sent_count(IssueId(1)).await.expect("reset");
        assert_eq!(store.issue(IssueId(1)).map(|i| i.sent_count), Some(0));

        let missing = store.set_issue_status(IssueId(2), IssueStatus::Ready).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subscriber_store_query() {
        let store = MemorySubscriberStore::new();

        let mut active = Subscriber::new(SubscriberId(1), "a@example.com");
        active.subscribe(NewsletterId(1), "test");
        let mut inactive = Subscriber::new(SubscriberId(2), "b@example.com");
        inactive.subscribe(NewsletterId(1), "test");
        inactive.active = false;
        let mut unsubscribed = Subscriber::new(SubscriberId(3), "c@example.com");
        unsubscribed.unsubscribe(NewsletterId(1), "test");

        for subscriber in [active, inactive, unsubscribed] {
            store.insert(subscriber).expect("insert");
        }

        let query = SubscriberQuery::active_subscribers(NewsletterId(1));
        let found = store.find(&query).await.expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mail, "a@example.com");
        assert_eq!(store.count(&query).await.expect("count"), 1);

        let loaded = store.load_by_email("B@EXAMPLE.COM").await.expect("load");
        assert_eq!(loaded.map(|s| s.id), Some(SubscriberId(2)));
    }
}
