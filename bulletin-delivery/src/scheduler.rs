//! Periodic driver for [`Dispatcher::run_tick`].

use std::sync::Arc;

use bulletin_common::{Signal, internal, tracing};
use tokio::sync::broadcast;

use crate::Dispatcher;

/// Runs one throttled tick per interval until shutdown
#[derive(Debug, Clone)]
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Tick until a shutdown signal arrives
    ///
    /// A tick that is running when the signal arrives completes first, so
    /// no row is left in flight by the scheduler itself.
    ///
    /// Ticks run with cron sending disabled too: rows released by the time
    /// budget or left behind by an expired claim are only sent from here.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let config = self.dispatcher.config();

        internal!(
            level = INFO,
            interval_secs = config.tick_interval_secs,
            throttle = config.throttle,
            use_cron = config.use_cron,
            "Dispatch scheduler starting"
        );

        let mut timer = tokio::time::interval(config.tick_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.dispatcher.run_tick(Some(config.throttle)).await {
                        Ok(report) if report.processed() > 0 => {
                            tracing::info!("Dispatch tick: {report}");
                        }
                        Ok(_) => {
                            tracing::debug!("Dispatch tick, nothing to send");
                        }
                        Err(e) => {
                            tracing::error!("Error running dispatch tick: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Dispatch scheduler received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Dispatch scheduler shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        internal!(level = INFO, "Dispatch scheduler shutdown complete");
    }
}
