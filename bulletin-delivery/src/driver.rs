//! Walks a claimed batch of spool rows and turns each into a message source.
//!
//! The driver is a one-shot cursor over the batch: once exhausted, a new
//! claim is needed. Rows whose issue, newsletter or subscriber cannot be
//! loaded are recorded as done with an error and skipped. The driver never
//! writes to the spool; outcomes collect in its processed list and the
//! dispatcher persists them.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use bulletin_common::{Issue, IssueId, Newsletter, NewsletterId, StoreError, internal};
use bulletin_source::{MessageSource, SourceError, SourceParts};
use bulletin_spool::{RowResult, RowStatus, SpoolRow, SpoolRowId};

use crate::Dispatcher;

/// A row ready to send
#[derive(Debug)]
pub struct Prepared {
    pub row: SpoolRow,
    pub source: Box<dyn MessageSource>,
}

/// Outcome of one row, waiting to be written back to the spool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub row_id: SpoolRowId,
    pub issue_id: IssueId,
    pub status: RowStatus,
    pub result: RowResult,
}

impl Processed {
    /// Whether the row counts as a successful send
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self.status, RowStatus::Done) && !self.result.error
    }
}

/// Cursor over a claimed batch
#[derive(Debug)]
pub struct SpoolDriver<'a> {
    dispatcher: &'a Dispatcher,
    rows: VecDeque<SpoolRow>,
    issues: HashMap<IssueId, Option<Arc<Issue>>>,
    newsletters: HashMap<NewsletterId, Option<Arc<Newsletter>>>,
    processed: Vec<Processed>,
}

impl<'a> SpoolDriver<'a> {
    #[must_use]
    pub fn new(dispatcher: &'a Dispatcher, rows: Vec<SpoolRow>) -> Self {
        Self {
            dispatcher,
            rows: rows.into(),
            issues: HashMap::new(),
            newsletters: HashMap::new(),
            processed: Vec::new(),
        }
    }

    /// Rows not yet handed out
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Prepare the next row, or `None` once the batch is exhausted
    pub async fn next(&mut self) -> Option<Prepared> {
        while let Some(row) = self.rows.pop_front() {
            match self.prepare(&row).await {
                Ok(source) => return Some(Prepared { row, source }),
                Err(error) => {
                    internal!(
                        level = WARN,
                        row_id = %row.id,
                        issue_id = %row.issue_id,
                        recipient = %self.dispatcher.logging.recipient(&row.recipient),
                        %error,
                        "Spool row cannot be prepared, marking it done with an error"
                    );
                    self.record(&row, RowStatus::Done, RowResult::failed(error.to_string()));
                }
            }
        }

        None
    }

    /// Record the outcome of a row
    pub fn record(&mut self, row: &SpoolRow, status: RowStatus, result: RowResult) {
        self.processed.push(Processed {
            row_id: row.id,
            issue_id: row.issue_id,
            status,
            result,
        });
    }

    /// Drain the recorded outcomes
    pub fn take_processed(&mut self) -> Vec<Processed> {
        std::mem::take(&mut self.processed)
    }

    /// Stop early, returning the ids of the rows never handed out
    pub fn abandon(&mut self) -> Vec<SpoolRowId> {
        self.rows.drain(..).map(|row| row.id).collect()
    }

    async fn prepare(&mut self, row: &SpoolRow) -> Result<Box<dyn MessageSource>, SourceError> {
        let issue = self
            .issue(row.issue_id)
            .await?
            .ok_or(SourceError::IssueNotFound(row.issue_id))?;
        let newsletter = self
            .newsletter(issue.newsletter_id)
            .await?
            .ok_or(SourceError::NewsletterNotFound(issue.newsletter_id))?;

        let recipient = match &row.data {
            Some(recipient) => recipient.clone(),
            None => self
                .dispatcher
                .subscribers
                .load_by_email(&row.recipient)
                .await?
                .map(|subscriber| subscriber.recipient())
                .ok_or_else(|| SourceError::SubscriberNotFound(row.recipient.clone()))?,
        };

        let factory = self
            .dispatcher
            .sources
            .get(self.dispatcher.config.source_for(&issue.content_type))?;

        factory.create(SourceParts {
            issue,
            newsletter,
            recipient,
            context: Arc::clone(&self.dispatcher.context),
        })
    }

    async fn issue(&mut self, id: IssueId) -> Result<Option<Arc<Issue>>, StoreError> {
        if let Some(issue) = self.issues.get(&id) {
            return Ok(issue.clone());
        }

        let issue = self.dispatcher.entities.load_issue(id).await?.map(Arc::new);
        self.issues.insert(id, issue.clone());
        Ok(issue)
    }

    async fn newsletter(
        &mut self,
        id: NewsletterId,
    ) -> Result<Option<Arc<Newsletter>>, StoreError> {
        if let Some(newsletter) = self.newsletters.get(&id) {
            return Ok(newsletter.clone());
        }

        let newsletter = self
            .dispatcher
            .entities
            .load_newsletter(id)
            .await?
            .map(Arc::new);
        self.newsletters.insert(id, newsletter.clone());
        Ok(newsletter)
    }
}
