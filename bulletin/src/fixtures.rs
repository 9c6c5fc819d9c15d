//! Content and subscribers loaded from a RON file.
//!
//! ```ron
//! (
//!     newsletters: [
//!         (id: 1, name: "Field Notes", from_name: "Field Notes", from_address: "notes@example.org"),
//!     ],
//!     issues: [
//!         (id: 10, newsletter_id: 1, published: true, content: (title: "Spring", body: "<p>Hi</p>")),
//!     ],
//!     subscribers: [
//!         (id: 1, mail: "reader@example.com", subscriptions: [(newsletter_id: 1, status: Subscribed)]),
//!     ],
//!     queue: [10],
//! )
//! ```

use std::path::Path;

use anyhow::Context;
use bulletin_common::{
    Issue, IssueId, Newsletter, StoreError, Subscriber,
    memory::{MemoryEntityStore, MemorySubscriberStore},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub newsletters: Vec<Newsletter>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    /// Issues to queue once loaded
    #[serde(default)]
    pub queue: Vec<IssueId>,
}

impl Fixtures {
    /// Read fixtures from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures from {}", path.display()))?;
        ron::from_str(&content)
            .with_context(|| format!("Failed to parse fixtures in {}", path.display()))
    }

    /// Move the fixtures into the stores, returning the issues to queue
    ///
    /// # Errors
    ///
    /// Returns an error if a store rejects a record
    pub fn install(
        self,
        entities: &MemoryEntityStore,
        subscribers: &MemorySubscriberStore,
    ) -> Result<Vec<IssueId>, StoreError> {
        for newsletter in self.newsletters {
            entities.insert_newsletter(newsletter)?;
        }
        for issue in self.issues {
            entities.insert_issue(issue)?;
        }
        for subscriber in self.subscribers {
            subscribers.insert(subscriber)?;
        }

        Ok(self.queue)
    }
}
