use std::time::{Duration, SystemTime};

use bulletin_common::{IssueId, Language, NewsletterId, Recipient};
use serde::{Deserialize, Serialize};

use crate::SpoolRowId;

/// Lifecycle state of a spool row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowStatus {
    Pending,
    InFlight,
    Done,
    Error,
}

impl RowStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Outcome recorded when a row reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    /// Whether the row failed; a `Done` row can still carry an error when its
    /// issue or subscriber could not be loaded
    pub error: bool,
    pub message: Option<String>,
    /// Language the message was actually rendered in
    pub language: Option<Language>,
}

impl RowResult {
    #[must_use]
    pub fn sent(language: Language) -> Self {
        Self {
            error: false,
            message: None,
            language: Some(language),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: Some(message.into()),
            language: None,
        }
    }
}

/// One unit of work: deliver one issue to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolRow {
    pub id: SpoolRowId,
    pub issue_id: IssueId,
    pub newsletter_id: NewsletterId,
    pub recipient: String,
    pub status: RowStatus,
    pub created_at: SystemTime,
    /// Set when the row is claimed, cleared when it is released
    pub claimed_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    /// Recipient resolved when the row was queued
    pub data: Option<Recipient>,
    pub result: Option<RowResult>,
}

impl SpoolRow {
    #[must_use]
    pub fn pending(
        id: SpoolRowId,
        issue_id: IssueId,
        newsletter_id: NewsletterId,
        recipient: Recipient,
    ) -> Self {
        Self {
            id,
            issue_id,
            newsletter_id,
            recipient: recipient.mail.clone(),
            status: RowStatus::Pending,
            created_at: SystemTime::now(),
            claimed_at: None,
            completed_at: None,
            data: Some(recipient),
            result: None,
        }
    }

    /// A row that can be claimed: pending, or in flight for at least `expiration`
    #[must_use]
    pub fn is_claimable(&self, now: SystemTime, expiration: Duration) -> bool {
        match (self.status, self.claimed_at) {
            (RowStatus::Pending, _) => true,
            (RowStatus::InFlight, Some(claimed_at)) => {
                now.duration_since(claimed_at).unwrap_or_default() >= expiration
            }
            (RowStatus::InFlight, None) => true,
            _ => false,
        }
    }

    /// Whether the row addresses `mail` for the same issue, ignoring case
    #[must_use]
    pub fn addresses(&self, issue_id: IssueId, mail: &str) -> bool {
        self.issue_id == issue_id && self.recipient.eq_ignore_ascii_case(mail)
    }
}

/// Selects rows for counting, listing and claiming
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpoolFilter {
    pub issue_id: Option<IssueId>,
    pub newsletter_id: Option<NewsletterId>,
    /// Ignored by `claim`, which always selects claimable rows
    pub statuses: Option<Vec<RowStatus>>,
}

impl SpoolFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn issue(mut self, issue_id: IssueId) -> Self {
        self.issue_id = Some(issue_id);
        self
    }

    #[must_use]
    pub const fn newsletter(mut self, newsletter_id: NewsletterId) -> Self {
        self.newsletter_id = Some(newsletter_id);
        self
    }

    #[must_use]
    pub fn status(mut self, status: RowStatus) -> Self {
        self.statuses.get_or_insert_with(Vec::new).push(status);
        self
    }

    /// Whether the row's issue and newsletter match, ignoring status
    #[must_use]
    pub fn matches_target(&self, row: &SpoolRow) -> bool {
        self.issue_id.is_none_or(|issue| row.issue_id == issue)
            && self
                .newsletter_id
                .is_none_or(|newsletter| row.newsletter_id == newsletter)
    }

    #[must_use]
    pub fn matches(&self, row: &SpoolRow) -> bool {
        self.matches_target(row)
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&row.status))
    }
}
