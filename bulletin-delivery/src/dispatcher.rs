//! The dispatcher: queues issues and sends throttled batches from the spool.
//!
//! Per issue the status moves `NotSent -> Pending -> Ready`, with
//! `SendOnPublish` standing in for `Pending` while an unpublished issue waits
//! for its publish event. Every tick claims at most `throttle` rows, sends
//! what can be prepared, and writes every outcome back to the spool before
//! updating the issue counters.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use bulletin_common::{
    BracketTokens, EntityStore, IssueId, IssueStatus, MailTransport, Newsletter, Recipient,
    Session, Subscriber, SubscriberStore, TokenReplacer, internal, logging::LoggingConfig,
    outgoing,
};
use bulletin_source::{
    CachePolicy, MessageSource, ResolverRegistry, SourceContext, SourceParts, SourceRegistry,
};
use bulletin_spool::{BackingStore, RowResult, RowStatus, SpoolError, SpoolFilter};

use crate::{
    DispatchConfig, Result,
    compose::compose,
    driver::{Processed, SpoolDriver},
    error::{ConfigError, PermanentError},
    report::{QueueOutcome, TickReport},
};

/// Default retention for terminal rows, seven days
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Queues issues and sends them in throttled ticks
#[derive(Debug)]
pub struct Dispatcher {
    pub(crate) spool: Arc<dyn BackingStore>,
    pub(crate) entities: Arc<dyn EntityStore>,
    pub(crate) subscribers: Arc<dyn SubscriberStore>,
    pub(crate) transport: Arc<dyn MailTransport>,
    pub(crate) sources: SourceRegistry,
    pub(crate) resolvers: ResolverRegistry,
    pub(crate) context: Arc<SourceContext>,
    pub(crate) config: DispatchConfig,
    pub(crate) retention: Duration,
    pub(crate) logging: LoggingConfig,
}

/// Builder for [`Dispatcher`]
#[derive(Debug)]
pub struct DispatcherBuilder {
    spool: Arc<dyn BackingStore>,
    entities: Arc<dyn EntityStore>,
    subscribers: Arc<dyn SubscriberStore>,
    transport: Arc<dyn MailTransport>,
    config: DispatchConfig,
    retention: Duration,
    session: Option<Arc<Session>>,
    tokens: Option<Arc<dyn TokenReplacer>>,
    sources: SourceRegistry,
    resolvers: Option<ResolverRegistry>,
    policy: Option<Arc<dyn CachePolicy>>,
    logging: LoggingConfig,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// How long terminal rows are kept before being purged
    #[must_use]
    pub const fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn tokens(mut self, tokens: Arc<dyn TokenReplacer>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    /// Replace the cache policy named in the source settings
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Validate the configuration and build the dispatcher
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration names unknown strategies
    /// or has invalid values
    pub fn build(self) -> std::result::Result<Dispatcher, ConfigError> {
        self.config.validate(&self.sources)?;

        let session = self.session.unwrap_or_default();
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(BracketTokens));
        let resolvers = self
            .resolvers
            .unwrap_or_else(|| ResolverRegistry::with_defaults(Arc::clone(&self.subscribers)));
        let mut context = SourceContext::new(self.config.source.clone(), session, tokens);
        if let Some(policy) = self.policy {
            context = context.with_policy(policy);
        }

        Ok(Dispatcher {
            spool: self.spool,
            entities: self.entities,
            subscribers: self.subscribers,
            transport: self.transport,
            sources: self.sources,
            resolvers,
            context: Arc::new(context),
            config: self.config,
            retention: self.retention,
            logging: self.logging,
        })
    }
}

impl Dispatcher {
    #[must_use]
    pub fn builder(
        spool: Arc<dyn BackingStore>,
        entities: Arc<dyn EntityStore>,
        subscribers: Arc<dyn SubscriberStore>,
        transport: Arc<dyn MailTransport>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            spool,
            entities,
            subscribers,
            transport,
            config: DispatchConfig::default(),
            retention: DEFAULT_RETENTION,
            session: None,
            tokens: None,
            sources: SourceRegistry::with_defaults(),
            resolvers: None,
            policy: None,
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[must_use]
    pub fn spool(&self) -> &Arc<dyn BackingStore> {
        &self.spool
    }

    /// Shared rendering context, including the source cache
    #[must_use]
    pub fn context(&self) -> &Arc<SourceContext> {
        &self.context
    }

    /// Check that a newsletter's recipient handler is registered
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownResolver`] if it is not
    pub fn validate_newsletter(
        &self,
        newsletter: &Newsletter,
    ) -> std::result::Result<(), ConfigError> {
        if self.resolvers.contains(&newsletter.recipient_handler) {
            Ok(())
        } else {
            Err(ConfigError::UnknownResolver {
                newsletter: newsletter.id,
                name: newsletter.recipient_handler.clone(),
            })
        }
    }

    /// Process up to `throttle` rows (all claimable rows when `None`)
    ///
    /// Per-row failures are recorded on the rows; only spool faults are
    /// returned as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool cannot be claimed from or written to
    #[tracing::instrument(skip(self))]
    pub async fn run_tick(&self, throttle: Option<usize>) -> Result<TickReport> {
        self.tick(throttle, &SpoolFilter::new()).await
    }

    /// One unbounded tick, run inline, when cron sending is disabled
    ///
    /// Returns `None` without touching the spool when sending is left to the
    /// scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool cannot be claimed from or written to
    pub async fn attempt_immediate_send(
        &self,
        filter: &SpoolFilter,
    ) -> Result<Option<TickReport>> {
        if self.config.use_cron {
            return Ok(None);
        }

        internal!(level = DEBUG, ?filter, "Sending immediately");
        self.tick(None, filter).await.map(Some)
    }

    async fn tick(&self, limit: Option<usize>, filter: &SpoolFilter) -> Result<TickReport> {
        let started = Instant::now();
        // Cached build output lives for one tick, so issue edits reach the next one
        self.context.cache.clear();
        let rows = self.spool.claim(limit, filter).await?;
        let claimed = rows.len();

        let mut report = TickReport::default();
        let mut driver = SpoolDriver::new(self, rows);

        while let Some(prepared) = driver.next().await {
            let row = &prepared.row;
            let recipient = self.logging.recipient(&row.recipient);

            match self.deliver(&*prepared.source).await {
                Ok(()) => {
                    outgoing!(
                        level = DEBUG,
                        row_id = %row.id,
                        issue_id = %row.issue_id,
                        %recipient,
                        "Message handed to transport"
                    );
                    driver.record(
                        row,
                        RowStatus::Done,
                        RowResult::sent(prepared.source.language().clone()),
                    );
                }
                Err(error) => {
                    outgoing!(
                        level = WARN,
                        row_id = %row.id,
                        issue_id = %row.issue_id,
                        %recipient,
                        %error,
                        "Message not delivered"
                    );
                    let mut result = RowResult::failed(error.to_string());
                    result.language = Some(prepared.source.language().clone());
                    driver.record(row, RowStatus::Error, result);
                }
            }

            if let Some(budget) = self.config.time_budget()
                && started.elapsed() >= budget
                && driver.remaining() > 0
            {
                let abandoned = driver.abandon();
                report.released = self.spool.release(&abandoned).await?;
                internal!(
                    level = INFO,
                    released = report.released,
                    "Tick time budget exhausted, releasing unprocessed rows"
                );
            }
        }

        let processed = driver.take_processed();
        self.persist(&processed, &mut report).await?;
        self.update_issues(&processed).await;

        let purged = self.spool.purge(self.retention).await?;
        report.pending = self
            .spool
            .count(
                &filter
                    .clone()
                    .status(RowStatus::Pending)
                    .status(RowStatus::InFlight),
            )
            .await?;

        if claimed > 0 || purged > 0 {
            internal!(level = INFO, claimed, purged, "Tick complete: {report}");
        }

        Ok(report)
    }

    async fn deliver(&self, source: &dyn MessageSource) -> Result<()> {
        let message = compose(source)?;
        self.transport.send(&message).await?;
        Ok(())
    }

    /// Write every outcome back to the spool
    async fn persist(&self, processed: &[Processed], report: &mut TickReport) -> Result<()> {
        for outcome in processed {
            match self
                .spool
                .complete(&outcome.row_id, outcome.status, outcome.result.clone())
                .await
            {
                Ok(()) => {}
                Err(error @ (SpoolError::InvalidTransition { .. } | SpoolError::NotFound(_))) => {
                    internal!(
                        level = WARN,
                        row_id = %outcome.row_id,
                        %error,
                        "Row changed under this tick, outcome dropped"
                    );
                    continue;
                }
                Err(error) => return Err(error.into()),
            }

            if outcome.is_sent() {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(())
    }

    /// Add the sent counts and mark issues with no pending rows as ready
    async fn update_issues(&self, processed: &[Processed]) {
        let mut sent: BTreeMap<IssueId, u64> = BTreeMap::new();
        for outcome in processed {
            *sent.entry(outcome.issue_id).or_default() += u64::from(outcome.is_sent());
        }

        for (issue_id, count) in sent {
            if count > 0
                && let Err(error) = self.entities.add_sent_count(issue_id, count).await
            {
                internal!(level = WARN, %issue_id, %error, "Could not update sent count");
            }

            match self.spool.pending_count(issue_id).await {
                Ok(0) => {
                    if let Err(error) = self
                        .entities
                        .set_issue_status(issue_id, IssueStatus::Ready)
                        .await
                    {
                        internal!(level = WARN, %issue_id, %error, "Could not mark issue ready");
                    } else {
                        internal!(level = INFO, %issue_id, "Issue sent to all recipients");
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    internal!(level = WARN, %issue_id, %error, "Could not count pending rows");
                }
            }
        }
    }

    /// Send an issue straight to a few addresses, bypassing the spool
    ///
    /// Addresses without a subscriber record are sent as anonymous
    /// recipients. Neither the spool nor the issue counters change.
    ///
    /// # Errors
    ///
    /// Returns an error if the address list is empty or too long, or the
    /// issue or its newsletter cannot be loaded
    #[tracing::instrument(skip(self, addresses), fields(addresses = addresses.len()))]
    pub async fn send_test(&self, issue_id: IssueId, addresses: &[String]) -> Result<TickReport> {
        if addresses.is_empty() {
            return Err(PermanentError::NoTestRecipients.into());
        }
        if addresses.len() > self.config.test_recipients_max {
            return Err(PermanentError::TooManyTestRecipients {
                count: addresses.len(),
                max: self.config.test_recipients_max,
            }
            .into());
        }

        self.context.cache.clear();

        let issue = Arc::new(
            self.entities
                .load_issue(issue_id)
                .await?
                .ok_or(PermanentError::IssueNotFound(issue_id))?,
        );
        let newsletter = Arc::new(
            self.entities
                .load_newsletter(issue.newsletter_id)
                .await?
                .ok_or(PermanentError::NewsletterNotFound(issue.newsletter_id))?,
        );
        let factory = self
            .sources
            .get(self.config.source_for(&issue.content_type))?;

        let mut report = TickReport::default();
        for address in addresses {
            let recipient = match self.subscribers.load_by_email(address).await? {
                Some(subscriber) => subscriber.recipient(),
                None => Subscriber::anonymous(
                    address.as_str(),
                    self.config.source.default_language.clone(),
                )
                .recipient(),
            };

            let source = factory.create(SourceParts {
                issue: Arc::clone(&issue),
                newsletter: Arc::clone(&newsletter),
                recipient,
                context: Arc::clone(&self.context),
            })?;

            let recipient = self.logging.recipient(address);
            match self.deliver(&*source).await {
                Ok(()) => {
                    outgoing!(level = INFO, %issue_id, %recipient, "Test message sent");
                    report.sent += 1;
                }
                Err(error) => {
                    outgoing!(level = WARN, %issue_id, %recipient, %error, "Test message failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Queue an issue for sending to its newsletter's recipients
    ///
    /// Unpublished issues are parked in `SendOnPublish` instead, and issues
    /// already `Ready` are left alone. With cron sending disabled the queued
    /// rows are sent right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue, newsletter or recipient handler cannot
    /// be found, or the spool rejects the rows
    #[tracing::instrument(skip(self))]
    pub async fn send_issue(&self, issue_id: IssueId) -> Result<QueueOutcome> {
        let issue = self
            .entities
            .load_issue(issue_id)
            .await?
            .ok_or(PermanentError::IssueNotFound(issue_id))?;
        let newsletter = self
            .entities
            .load_newsletter(issue.newsletter_id)
            .await?
            .ok_or(PermanentError::NewsletterNotFound(issue.newsletter_id))?;

        if issue.status == IssueStatus::Ready {
            internal!(level = INFO, %issue_id, "Issue already sent, not queueing again");
            return Ok(QueueOutcome::AlreadySent);
        }

        if !issue.published {
            self.entities
                .set_issue_status(issue_id, IssueStatus::SendOnPublish)
                .await?;
            internal!(level = INFO, %issue_id, "Issue unpublished, sending on publish");
            return Ok(QueueOutcome::Deferred);
        }

        let resolver = self
            .resolvers
            .get(&newsletter.recipient_handler)
            .map_err(|_| ConfigError::UnknownResolver {
                newsletter: newsletter.id,
                name: newsletter.recipient_handler.clone(),
            })?;
        let recipients = resolver.resolve(newsletter.id).await?;
        let created = self
            .spool
            .enqueue(issue_id, newsletter.id, &recipients)
            .await?;

        if issue.status != IssueStatus::Pending {
            self.entities.reset_sent_count(issue_id).await?;
        }
        self.refresh_status(issue_id).await?;

        internal!(
            level = INFO,
            %issue_id,
            resolved = recipients.len(),
            created,
            "Issue queued"
        );

        let report = self
            .attempt_immediate_send(&SpoolFilter::new().issue(issue_id))
            .await?;

        Ok(QueueOutcome::Queued { created, report })
    }

    /// Queue an issue waiting in `SendOnPublish` once it is published
    ///
    /// Returns `None` when the issue is not waiting or not yet published.
    ///
    /// # Errors
    ///
    /// As for [`Dispatcher::send_issue`]
    pub async fn on_publish(&self, issue_id: IssueId) -> Result<Option<QueueOutcome>> {
        let Some(issue) = self.entities.load_issue(issue_id).await? else {
            return Err(PermanentError::IssueNotFound(issue_id).into());
        };

        if issue.status == IssueStatus::SendOnPublish && issue.published {
            self.send_issue(issue_id).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Queue again the recipients whose rows ended in error
    ///
    /// Recipients that have since been sent to are left out. With cron
    /// sending disabled the new rows are sent right away. Returns the number
    /// of rows created.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool cannot be read or written
    #[tracing::instrument(skip(self))]
    pub async fn requeue_failed(&self, issue_id: IssueId) -> Result<usize> {
        let rows = self
            .spool
            .rows(
                &SpoolFilter::new()
                    .issue(issue_id)
                    .status(RowStatus::Error)
                    .status(RowStatus::Done),
            )
            .await?;

        let delivered: HashSet<String> = rows
            .iter()
            .filter(|row| {
                row.status == RowStatus::Done
                    && row.result.as_ref().is_some_and(|result| !result.error)
            })
            .map(|row| row.recipient.to_ascii_lowercase())
            .collect();

        let Some(newsletter_id) = rows.first().map(|row| row.newsletter_id) else {
            return Ok(0);
        };

        let recipients: Vec<Recipient> = rows
            .into_iter()
            .filter(|row| {
                row.status == RowStatus::Error
                    && !delivered.contains(&row.recipient.to_ascii_lowercase())
            })
            .map(|row| {
                let mail = row.recipient;
                row.data.unwrap_or_else(|| Recipient::address(mail))
            })
            .collect();

        let created = self
            .spool
            .enqueue(issue_id, newsletter_id, &recipients)
            .await?;

        if created > 0 {
            self.refresh_status(issue_id).await?;
            internal!(level = INFO, %issue_id, created, "Failed recipients queued again");

            if let Some(report) = self
                .attempt_immediate_send(&SpoolFilter::new().issue(issue_id))
                .await?
            {
                internal!(level = INFO, %issue_id, "Requeued recipients sent: {report}");
            }
        }

        Ok(created)
    }

    /// `Pending` while rows remain, `Ready` otherwise
    async fn refresh_status(&self, issue_id: IssueId) -> Result<()> {
        let status = if self.spool.pending_count(issue_id).await? > 0 {
            IssueStatus::Pending
        } else {
            IssueStatus::Ready
        };

        self.entities.set_issue_status(issue_id, status).await?;
        Ok(())
    }
}
