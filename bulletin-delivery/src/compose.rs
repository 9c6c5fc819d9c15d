//! Turns a message source into the message handed to the transport.

use bulletin_common::{Format, Headers, OutboundMessage};
use bulletin_source::{MessageSource, SourceError};

/// Render a source into an outbound message
///
/// The footer follows the body, separated by a blank line for plain text.
///
/// # Errors
///
/// Returns an error if any part of the message cannot be rendered
pub fn compose(source: &dyn MessageSource) -> Result<OutboundMessage, SourceError> {
    let format = source.format();
    let body = source.body(format)?;
    let footer = source.footer(format)?;
    let body = match format {
        Format::Plain => format!("{body}\n\n{footer}"),
        Format::Html => format!("{body}\n{footer}"),
    };

    let mut message = OutboundMessage {
        to: source.recipient().to_string(),
        from: source.from_formatted(),
        subject: source.subject()?,
        body,
        format,
        headers: Headers::new(),
        attachments: source.attachments(),
    };

    let mut base = Headers::new();
    base.set("MIME-Version", "1.0");
    base.set("Content-Type", message.content_type());
    message.headers = source.headers(base)?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bulletin_common::{
        BracketTokens, Format, Issue, IssueContent, IssueId, Newsletter, NewsletterId, Recipient,
        Session,
    };
    use bulletin_source::{EntitySource, SourceContext, SourceParts, SourceSettings};

    use super::*;

    fn source(format: Format) -> EntitySource {
        let mut newsletter = Newsletter::new(
            NewsletterId(1),
            "Field Notes",
            "Field Notes",
            "notes@example.org",
        );
        newsletter.format = format;

        let issue = Issue::new(
            IssueId(2),
            NewsletterId(1),
            IssueContent {
                title: "Spring".to_string(),
                body: "<p>Hello [subscriber:mail]</p>".to_string(),
                attachments: Vec::new(),
            },
        );

        EntitySource::new(SourceParts {
            issue: Arc::new(issue),
            newsletter: Arc::new(newsletter),
            recipient: Recipient::address("reader@example.com"),
            context: Arc::new(SourceContext::new(
                SourceSettings::default(),
                Arc::new(Session::default()),
                Arc::new(BracketTokens),
            )),
        })
        .expect("source")
    }

    #[test]
    fn test_compose_plain() {
        let message = compose(&source(Format::Plain)).expect("compose");

        assert_eq!(message.to, "reader@example.com");
        assert_eq!(message.subject, "[Field Notes] Spring");
        assert!(message.body.contains("Hello reader@example.com"));
        assert!(message.body.contains("\n\n-- \nField Notes\nUnsubscribe: "));
        assert_eq!(message.headers.get("MIME-Version"), Some("1.0"));
        assert_eq!(
            message.headers.get("content-type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(message.headers.get("Precedence"), Some("bulk"));
    }

    #[test]
    fn test_compose_html() {
        let message = compose(&source(Format::Html)).expect("compose");

        assert!(message.body.starts_with("<h2>Spring</h2>"));
        assert!(message.body.contains("\n<hr />"));
        assert_eq!(
            message.headers.get("Content-Type"),
            Some("text/html; charset=utf-8")
        );
    }
}
