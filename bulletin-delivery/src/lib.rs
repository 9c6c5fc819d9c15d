//! Spool driver, throttled dispatcher and scheduler.
//!
//! [`Dispatcher::send_issue`] resolves a newsletter's recipients into spool
//! rows; [`Dispatcher::run_tick`] claims a throttled batch, renders each row
//! through its message source and hands the result to the mail transport.
//! [`Scheduler`] runs ticks on an interval.

pub mod compose;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod service;

pub use compose::compose;
pub use config::DispatchConfig;
pub use dispatcher::{DEFAULT_RETENTION, Dispatcher, DispatcherBuilder};
pub use driver::{Prepared, Processed, SpoolDriver};
pub use error::{ConfigError, DeliveryError, PermanentError, Result, SystemError};
pub use report::{IssueStats, QueueOutcome, TickReport};
pub use scheduler::Scheduler;
pub use service::SpoolQueryService;
