//! The message handed to the mail transport.

use serde::Serialize;

use crate::{Attachment, Format, Headers};

/// One fully rendered outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    /// Sender, possibly RFC 2047 formatted
    pub from: String,
    pub subject: String,
    /// Body with the footer already appended
    pub body: String,
    pub format: Format,
    pub headers: Headers,
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    /// MIME content type of the body
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self.format {
            Format::Plain => "text/plain; charset=utf-8",
            Format::Html => "text/html; charset=utf-8",
        }
    }
}
