use std::str::FromStr;

use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Log a message leaving the dispatcher, i.e. handed to the mail transport
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

/// Log an internal lifecycle event (ticks, claims, status changes)
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Replace recipient addresses in log events with a redacted form
    #[serde(default)]
    pub redact_recipients: bool,
}

impl LoggingConfig {
    /// Format a recipient address for a log event
    #[must_use]
    pub fn recipient(&self, mail: &str) -> String {
        redact_email(mail, self.redact_recipients)
    }
}

/// Redact an email address if redaction is enabled
///
/// Keeps the first character of the local part and the full domain, so
/// `alice@example.com` becomes `a***@example.com`.
#[must_use]
pub fn redact_email(mail: &str, redact: bool) -> String {
    if !redact {
        return mail.to_string();
    }

    match mail.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("bulletin")
                })),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(redact_email("alice@example.com", false), "alice@example.com");
        assert_eq!(redact_email("alice@example.com", true), "a***@example.com");
        assert_eq!(redact_email("not-an-address", true), "***");
    }

    #[test]
    fn test_logging_config_defaults_to_clear_text() {
        let config = LoggingConfig::default();
        assert_eq!(config.recipient("bob@example.org"), "bob@example.org");
    }
}
