//! Recipient resolution: who receives a newsletter.

use std::sync::Arc;

use async_trait::async_trait;
use bulletin_common::{NewsletterId, Recipient, SubscriberQuery, SubscriberStore};

use crate::Result;

/// Produces the recipients of a newsletter
#[async_trait]
pub trait RecipientResolver: Send + Sync + std::fmt::Debug {
    /// All eligible recipients; empty for an unknown newsletter
    async fn resolve(&self, newsletter: NewsletterId) -> Result<Vec<Recipient>>;

    /// Number of eligible recipients, without materialising them
    async fn count(&self, newsletter: NewsletterId) -> Result<usize>;
}

/// Every active subscriber with a confirmed subscription
#[derive(Debug, Clone)]
pub struct ActiveSubscribers {
    subscribers: Arc<dyn SubscriberStore>,
}

impl ActiveSubscribers {
    #[must_use]
    pub fn new(subscribers: Arc<dyn SubscriberStore>) -> Self {
        Self { subscribers }
    }
}

#[async_trait]
impl RecipientResolver for ActiveSubscribers {
    async fn resolve(&self, newsletter: NewsletterId) -> Result<Vec<Recipient>> {
        let query = SubscriberQuery::active_subscribers(newsletter);
        Ok(self
            .subscribers
            .find(&query)
            .await?
            .iter()
            .map(bulletin_common::Subscriber::recipient)
            .collect())
    }

    async fn count(&self, newsletter: NewsletterId) -> Result<usize> {
        let query = SubscriberQuery::active_subscribers(newsletter);
        Ok(self.subscribers.count(&query).await?)
    }
}
