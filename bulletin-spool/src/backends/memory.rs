use std::{
    sync::{Arc, RwLock},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use bulletin_common::{IssueId, NewsletterId, Recipient};

use crate::{
    RowResult, RowStatus, SpoolFilter, SpoolRow, SpoolRowId, backends::rows::Rows,
    r#trait::BackingStore,
};

/// In-memory backing store
///
/// Rows live in a `BTreeMap` keyed by their ULID behind an `RwLock`. Every
/// state change takes the write lock, which is what makes `claim` atomic.
/// Nothing survives the process; use [`crate::FileBackingStore`] for that.
///
/// # Capacity Management
/// An optional capacity bounds the number of rows held, terminal rows
/// included. `enqueue` fails without inserting anything when the new rows
/// would not fit; purging terminal rows frees room.
#[derive(Debug, Clone)]
pub struct MemoryBackingStore {
    inner: Arc<RwLock<Rows>>,
    /// Maximum number of rows to hold (None = unlimited)
    capacity: Option<usize>,
    /// How long a claim stays valid before the row may be claimed again
    expiration: Duration,
}

impl MemoryBackingStore {
    /// Default in-flight expiration, two hours
    pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(2 * 60 * 60);

    /// Create an empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Rows::default())),
            capacity: None,
            expiration: Self::DEFAULT_EXPIRATION,
        }
    }

    /// Create an empty store holding at most `capacity` rows
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Set the in-flight expiration window
    #[must_use]
    pub const fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Number of rows held, terminal rows included
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[must_use]
    pub const fn expiration(&self) -> Duration {
        self.expiration
    }
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    #[tracing::instrument(skip(self, recipients), fields(recipients = recipients.len()))]
    async fn enqueue(
        &self,
        issue_id: IssueId,
        newsletter_id: NewsletterId,
        recipients: &[Recipient],
    ) -> crate::Result<usize> {
        let created =
            self.inner
                .write()?
                .enqueue(issue_id, newsletter_id, recipients, self.capacity)?;

        tracing::debug!(created = created.len(), "Enqueued spool rows");
        Ok(created.len())
    }

    #[tracing::instrument(skip(self))]
    async fn claim(
        &self,
        limit: Option<usize>,
        filter: &SpoolFilter,
    ) -> crate::Result<Vec<SpoolRow>> {
        let claimed =
            self.inner
                .write()?
                .claim(limit, filter, SystemTime::now(), self.expiration);

        tracing::debug!(claimed = claimed.len(), "Claimed spool rows");
        Ok(claimed)
    }

    async fn complete(
        &self,
        id: &SpoolRowId,
        status: RowStatus,
        result: RowResult,
    ) -> crate::Result<()> {
        self.inner.write()?.complete(id, status, result)?;
        Ok(())
    }

    async fn release(&self, ids: &[SpoolRowId]) -> crate::Result<usize> {
        Ok(self.inner.write()?.release(ids).len())
    }

    async fn get(&self, id: &SpoolRowId) -> crate::Result<SpoolRow> {
        self.inner.read()?.get(id)
    }

    async fn rows(&self, filter: &SpoolFilter) -> crate::Result<Vec<SpoolRow>> {
        Ok(self.inner.read()?.select(filter))
    }

    async fn count(&self, filter: &SpoolFilter) -> crate::Result<usize> {
        Ok(self.inner.read()?.count(filter))
    }

    async fn purge(&self, retention: Duration) -> crate::Result<usize> {
        Ok(self
            .inner
            .write()?
            .purge(retention, SystemTime::now())
            .len())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::SpoolError;

    fn recipients(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient::address(format!("user{i}@example.com")))
            .collect()
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let store = MemoryBackingStore::new();

        let created = store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(4))
            .await
            .expect("enqueue");
        assert_eq!(created, 4);

        let created = store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(4))
            .await
            .expect("enqueue again");
        assert_eq!(created, 0);
        assert_eq!(store.len(), 4);

        let mixed_case = [Recipient::address("USER0@example.com")];
        let created = store
            .enqueue(IssueId(1), NewsletterId(1), &mixed_case)
            .await
            .expect("enqueue mixed case");
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn test_claim_in_queue_order() {
        let store = MemoryBackingStore::new();
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(5))
            .await
            .expect("enqueue");

        let claimed = store.claim(Some(3), &SpoolFilter::new()).await.expect("claim");
        let addresses: Vec<_> = claimed.iter().map(|row| row.recipient.as_str()).collect();
        assert_eq!(
            addresses,
            ["user0@example.com", "user1@example.com", "user2@example.com"]
        );
        assert!(claimed.iter().all(|row| row.status == RowStatus::InFlight));
    }

    #[tokio::test]
    async fn test_expired_claim_is_reclaimed() {
        let store = MemoryBackingStore::new().with_expiration(Duration::from_secs(60));
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(2))
            .await
            .expect("enqueue");

        let first = store.claim(None, &SpoolFilter::new()).await.expect("claim");
        assert_eq!(first.len(), 2);
        assert!(
            store
                .claim(None, &SpoolFilter::new())
                .await
                .expect("claim")
                .is_empty()
        );

        // Simulate a worker that crashed ten minutes ago
        {
            let mut inner = store.inner.write().expect("lock");
            let row = inner.rows.get_mut(&first[0].id).expect("row");
            row.claimed_at = Some(SystemTime::now() - Duration::from_secs(600));
        }

        let reclaimed = store.claim(None, &SpoolFilter::new()).await.expect("claim");
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_complete_requires_in_flight() {
        let store = MemoryBackingStore::new();
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(1))
            .await
            .expect("enqueue");
        let id = store.rows(&SpoolFilter::new()).await.expect("rows")[0].id;

        let early = store
            .complete(&id, RowStatus::Done, RowResult::failed("x"))
            .await;
        assert!(matches!(early, Err(SpoolError::InvalidTransition { .. })));

        store.claim(None, &SpoolFilter::new()).await.expect("claim");
        let back_to_pending = store
            .complete(&id, RowStatus::Pending, RowResult::failed("x"))
            .await;
        assert!(matches!(
            back_to_pending,
            Err(SpoolError::InvalidTransition { .. })
        ));

        store
            .complete(&id, RowStatus::Error, RowResult::failed("550"))
            .await
            .expect("complete");
        let twice = store
            .complete(&id, RowStatus::Done, RowResult::failed("x"))
            .await;
        assert!(matches!(twice, Err(SpoolError::InvalidTransition { .. })));

        let row = store.get(&id).await.expect("get");
        assert_eq!(row.status, RowStatus::Error);
        assert!(row.completed_at.is_some());
        assert_eq!(row.result.map(|r| r.message), Some(Some("550".to_string())));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store = MemoryBackingStore::with_capacity(3);
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(2))
            .await
            .expect("enqueue");

        let result = store
            .enqueue(IssueId(2), NewsletterId(1), &recipients(2))
            .await;
        assert!(
            result
                .expect_err("over capacity")
                .to_string()
                .contains("capacity exceeded")
        );
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_only_terminal_rows() {
        let store = MemoryBackingStore::new();
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(3))
            .await
            .expect("enqueue");
        let claimed = store.claim(Some(2), &SpoolFilter::new()).await.expect("claim");
        store
            .complete(
                &claimed[0].id,
                RowStatus::Done,
                RowResult::sent(bulletin_common::Language::default()),
            )
            .await
            .expect("complete");

        let purged = store.purge(Duration::ZERO).await.expect("purge");
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.pending_count(IssueId(1)).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn test_release_returns_rows_to_pending() {
        let store = MemoryBackingStore::new();
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(2))
            .await
            .expect("enqueue");
        let claimed = store.claim(None, &SpoolFilter::new()).await.expect("claim");
        let ids: Vec<_> = claimed.iter().map(|row| row.id).collect();

        assert_eq!(store.release(&ids).await.expect("release"), 2);
        let pending = store
            .count(&SpoolFilter::new().status(RowStatus::Pending))
            .await
            .expect("count");
        assert_eq!(pending, 2);
    }
}
