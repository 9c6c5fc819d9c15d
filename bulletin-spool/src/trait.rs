use std::time::Duration;

use async_trait::async_trait;
use bulletin_common::{IssueId, NewsletterId, Recipient};

use crate::{RowResult, RowStatus, SpoolFilter, SpoolRow, SpoolRowId};

/// Storage for spool rows
///
/// Implementations must make [`BackingStore::claim`] atomic: two concurrent
/// callers never receive the same row unless its claim has expired.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Insert one pending row per recipient
    ///
    /// Recipients that already have a pending or in-flight row for the issue
    /// are skipped, as are duplicates within `recipients`.
    ///
    /// Returns the number of rows created.
    async fn enqueue(
        &self,
        issue_id: IssueId,
        newsletter_id: NewsletterId,
        recipients: &[Recipient],
    ) -> crate::Result<usize>;

    /// Take up to `limit` claimable rows matching `filter` (all when `None`),
    /// mark them in flight and return them oldest first
    ///
    /// Returns an empty batch when nothing is claimable.
    async fn claim(&self, limit: Option<usize>, filter: &SpoolFilter)
    -> crate::Result<Vec<SpoolRow>>;

    /// Move an in-flight row to a terminal state
    ///
    /// # Errors
    ///
    /// [`crate::SpoolError::InvalidTransition`] if the row is not in flight or
    /// `status` is not terminal.
    async fn complete(
        &self,
        id: &SpoolRowId,
        status: RowStatus,
        result: RowResult,
    ) -> crate::Result<()>;

    /// Return in-flight rows to pending, for rows claimed but not processed
    ///
    /// Returns the number of rows released.
    async fn release(&self, ids: &[SpoolRowId]) -> crate::Result<usize>;

    /// Read a single row
    async fn get(&self, id: &SpoolRowId) -> crate::Result<SpoolRow>;

    /// All rows matching `filter`, oldest first
    async fn rows(&self, filter: &SpoolFilter) -> crate::Result<Vec<SpoolRow>>;

    /// Number of rows matching `filter`
    async fn count(&self, filter: &SpoolFilter) -> crate::Result<usize>;

    /// Rows of an issue that still need processing (pending or in flight)
    async fn pending_count(&self, issue_id: IssueId) -> crate::Result<usize> {
        self.count(
            &SpoolFilter::new()
                .issue(issue_id)
                .status(RowStatus::Pending)
                .status(RowStatus::InFlight),
        )
        .await
    }

    /// Delete terminal rows completed at least `retention` ago
    ///
    /// Returns the number of rows deleted.
    async fn purge(&self, retention: Duration) -> crate::Result<usize>;
}
