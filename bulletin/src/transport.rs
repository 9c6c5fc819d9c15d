use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bulletin_common::{
    MailTransport, OutboundMessage, TransportError, logging::LoggingConfig, outgoing,
};

/// Dry-run transport: logs every message instead of sending it
#[derive(Debug, Default)]
pub struct LogTransport {
    logging: LoggingConfig,
    sent: AtomicUsize,
}

impl LogTransport {
    #[must_use]
    pub const fn new(logging: LoggingConfig) -> Self {
        Self {
            logging,
            sent: AtomicUsize::new(0),
        }
    }

    /// Messages logged so far
    #[must_use]
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if message.to.is_empty() {
            return Err(TransportError::Rejected("empty recipient".to_string()));
        }

        outgoing!(
            level = INFO,
            to = %self.logging.recipient(&message.to),
            from = %message.from,
            subject = %message.subject,
            format = %message.format,
            headers = message.headers.len(),
            bytes = message.body.len(),
            attachments = message.attachments.len(),
            "Dry run, message not sent"
        );
        outgoing!("{}", message.headers);

        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bulletin_common::{Format, Headers};

    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            from: "notes@example.org".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            format: Format::Plain,
            headers: Headers::new(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_counts_logged_messages() {
        let transport = LogTransport::default();
        transport.send(&message("a@example.com")).await.expect("send");
        transport.send(&message("b@example.com")).await.expect("send");
        assert_eq!(transport.sent(), 2);

        assert!(transport.send(&message("")).await.is_err());
        assert_eq!(transport.sent(), 2);
    }
}
