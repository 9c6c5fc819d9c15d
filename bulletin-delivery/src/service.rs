//! Read-only view of dispatch state for control surfaces.

use async_trait::async_trait;
use bulletin_common::IssueId;
use bulletin_spool::{RowStatus, SpoolFilter};

use crate::{Dispatcher, Result, report::IssueStats};

/// Queries over the spool, decoupled from the concrete [`Dispatcher`]
///
/// # Example
///
/// ```rust,ignore
/// async fn remaining(service: &dyn SpoolQueryService, issue: IssueId) -> usize {
///     service.pending_count(issue).await.unwrap_or_default()
/// }
/// ```
#[async_trait]
pub trait SpoolQueryService: Send + Sync {
    /// Rows of an issue still pending or in flight
    async fn pending_count(&self, issue_id: IssueId) -> Result<usize>;

    /// Rows matching a filter
    async fn count(&self, filter: &SpoolFilter) -> Result<usize>;

    /// Sent, pending and failed counts for an issue
    async fn stats(&self, issue_id: IssueId) -> Result<IssueStats>;
}

#[async_trait]
impl SpoolQueryService for Dispatcher {
    async fn pending_count(&self, issue_id: IssueId) -> Result<usize> {
        Ok(self.spool.pending_count(issue_id).await?)
    }

    async fn count(&self, filter: &SpoolFilter) -> Result<usize> {
        Ok(self.spool.count(filter).await?)
    }

    async fn stats(&self, issue_id: IssueId) -> Result<IssueStats> {
        let rows = self
            .spool
            .rows(&SpoolFilter::new().issue(issue_id))
            .await?;

        Ok(rows.iter().fold(IssueStats::default(), |mut stats, row| {
            match (row.status, row.result.as_ref()) {
                (RowStatus::Pending | RowStatus::InFlight, _) => stats.pending += 1,
                (RowStatus::Done, Some(result)) if !result.error => stats.sent += 1,
                _ => stats.failed += 1,
            }
            stats
        }))
    }
}
