use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use bulletin_common::{
    IssueId, MailTransport, Signal, internal,
    logging::{self, LoggingConfig},
    memory::{MemoryEntityStore, MemorySubscriberStore},
};
use bulletin_delivery::{DispatchConfig, Dispatcher, Scheduler, TickReport};
use bulletin_spool::{SpoolConfig, SpoolFilter};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{fixtures::Fixtures, transport::LogTransport};

/// Top-level configuration
///
/// ```ron
/// Bulletin (
///     spool: ( backend: File(path: "spool"), expiration_secs: 7200 ),
///     dispatch: ( throttle: 20, tick_interval_secs: 60 ),
///     logging: ( redact_recipients: true ),
///     fixtures: Some("fixtures.ron"),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Bulletin {
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// RON file with newsletters, issues and subscribers to load at startup
    #[serde(default)]
    pub fixtures: Option<PathBuf>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Everything a running instance needs
#[derive(Debug)]
pub struct Runtime {
    pub dispatcher: Arc<Dispatcher>,
    pub entities: MemoryEntityStore,
    pub subscribers: MemorySubscriberStore,
    pub transport: Arc<LogTransport>,
    /// Issues named in the fixtures' queue list
    pub queue: Vec<IssueId>,
}

/// Wait for CTRL+C or SIGTERM, then broadcast [`Signal::Shutdown`]
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed or nothing
/// is listening for the broadcast
#[tracing::instrument(level = tracing::Level::TRACE)]
pub async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Bulletin {
    /// Build the stores, transport and dispatcher, and load any fixtures
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the fixtures
    /// cannot be loaded
    pub fn runtime(&self) -> anyhow::Result<Runtime> {
        let entities = MemoryEntityStore::new();
        let subscribers = MemorySubscriberStore::new();
        let transport = Arc::new(LogTransport::new(self.logging.clone()));

        let fixtures = match &self.fixtures {
            Some(path) => Fixtures::load(path)?,
            None => Fixtures::default(),
        };
        let newsletters = fixtures.newsletters.clone();
        let queue = fixtures.install(&entities, &subscribers)?;

        let spool = self
            .spool
            .into_backing_store()
            .context("Failed to open the spool")?;

        let dispatcher = Dispatcher::builder(
            spool,
            Arc::new(entities.clone()),
            Arc::new(subscribers.clone()),
            Arc::clone(&transport) as Arc<dyn MailTransport>,
        )
        .config(self.dispatch.clone())
        .retention(self.spool.retention())
        .logging(self.logging.clone())
        .build()
        .context("Invalid dispatch configuration")?;

        for newsletter in &newsletters {
            dispatcher
                .validate_newsletter(newsletter)
                .context("Invalid newsletter")?;
        }

        Ok(Runtime {
            dispatcher: Arc::new(dispatcher),
            entities,
            subscribers,
            transport,
            queue,
        })
    }

    /// Queue the fixture issues, then run a single throttled tick
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built or the spool fails
    pub async fn run_once(&self) -> anyhow::Result<TickReport> {
        let runtime = self.runtime()?;
        runtime.queue_fixtures().await?;

        let report = runtime
            .dispatcher
            .run_tick(Some(self.dispatch.throttle))
            .await?;
        internal!(level = INFO, "Tick finished: {report}");

        Ok(report)
    }

    /// Run the scheduler until a shutdown signal
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid,
    /// or the signal handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let runtime = self.runtime()?;
        internal!(level = INFO, "Controller running");

        runtime.queue_fixtures().await?;

        let scheduler = Scheduler::new(Arc::clone(&runtime.dispatcher));
        let receiver = SHUTDOWN_BROADCAST.subscribe();
        let scheduler = tokio::spawn(async move { scheduler.serve(receiver).await });

        let ret = shutdown().await;

        internal!("Shutting down...");
        scheduler.await?;

        internal!(
            level = INFO,
            sent = runtime.transport.sent(),
            "Shutdown complete"
        );

        ret
    }
}

impl Runtime {
    /// Queue every issue named in the fixtures that the spool has no rows
    /// for yet
    ///
    /// Issues already spooled by an earlier run are left to the scheduler,
    /// so a restart does not mail their readers again.
    ///
    /// # Errors
    ///
    /// Returns the first queueing failure
    pub async fn queue_fixtures(&self) -> anyhow::Result<()> {
        for issue_id in &self.queue {
            let spooled = self
                .dispatcher
                .spool()
                .count(&SpoolFilter::new().issue(*issue_id))
                .await?;
            if spooled > 0 {
                internal!(
                    level = INFO,
                    %issue_id,
                    rows = spooled,
                    "Fixture issue already spooled, not queueing again"
                );
                continue;
            }

            let outcome = self
                .dispatcher
                .send_issue(*issue_id)
                .await
                .with_context(|| format!("Failed to queue issue {issue_id}"))?;
            internal!(level = INFO, %issue_id, ?outcome, "Fixture issue queued");
        }

        Ok(())
    }
}
