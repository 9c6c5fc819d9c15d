//! Message sources: per-recipient rendering of an issue.
//!
//! A source is built for one (issue, recipient) pair at send time and thrown
//! away afterwards. Rendering is split in two steps: the *build* step does
//! everything that is the same for all recipients of a language (translation
//! pick, HTML reduction), the *final* step substitutes tokens while
//! impersonating the recipient.

use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use bulletin_common::{
    Actor, Attachment, Format, Headers, Issue, IssueContent, Language, Newsletter, Recipient,
    Sanitize, Session, SubscriberId, TokenContext, TokenReplacer, tokens::escape_html,
};

use crate::{
    Result,
    cache::{CacheGroup, CachePolicy, CacheStore, ScopedCache},
    config::SourceSettings,
    headers::{format_address, newsletter_headers},
    html::html_to_text,
    links::UnsubscribeSigner,
};

const PLAIN_FOOTER: &str = "-- \n[newsletter:name]\nUnsubscribe: [subscriber:unsubscribe-url]";
const HTML_FOOTER: &str = "<hr />\n<p>[newsletter:name]</p>\n<p><a href=\"[subscriber:unsubscribe-url]\">Unsubscribe</a></p>";

/// Everything needed to produce one outbound message
pub trait MessageSource: Send + Sync + fmt::Debug {
    fn issue(&self) -> &Issue;

    fn newsletter(&self) -> &Newsletter;

    /// Recipient address
    fn recipient(&self) -> &str;

    /// Language the content was actually rendered in, after translation fallback
    fn language(&self) -> &Language;

    /// Format the message should be sent in
    fn format(&self) -> Format {
        self.newsletter().format
    }

    fn from_address(&self) -> &str;

    /// Sender with display name, or the bare address when formatting is off
    fn from_formatted(&self) -> String;

    /// Subject line without any line breaks
    ///
    /// # Errors
    ///
    /// Returns an error if token replacement fails
    fn subject(&self) -> Result<String>;

    /// # Errors
    ///
    /// Returns an error if rendering or token replacement fails
    fn body(&self, format: Format) -> Result<String>;

    /// # Errors
    ///
    /// Returns an error if rendering or token replacement fails
    fn footer(&self, format: Format) -> Result<String>;

    /// `base` merged with the newsletter headers
    ///
    /// # Errors
    ///
    /// Returns an error if the unsubscribe link cannot be built
    fn headers(&self, base: Headers) -> Result<Headers>;

    fn attachments(&self) -> Vec<Attachment>;
}

/// Run-scoped collaborators shared by all sources
#[derive(Debug)]
pub struct SourceContext {
    pub settings: SourceSettings,
    pub session: Arc<Session>,
    pub tokens: Arc<dyn TokenReplacer>,
    pub policy: Arc<dyn CachePolicy>,
    pub cache: CacheStore,
    pub signer: UnsubscribeSigner,
}

impl SourceContext {
    /// Build a context with a fresh cache and the policy named in `settings`
    #[must_use]
    pub fn new(
        settings: SourceSettings,
        session: Arc<Session>,
        tokens: Arc<dyn TokenReplacer>,
    ) -> Self {
        let policy = settings.cache.build(&session);
        let signer = UnsubscribeSigner::new(
            &settings.site_url,
            settings.unsubscribe_secret.as_bytes().to_vec(),
        );

        Self {
            settings,
            session,
            tokens,
            policy,
            cache: CacheStore::new(),
            signer,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.policy = policy;
        self
    }
}

/// Inputs for constructing a source
#[derive(Debug, Clone)]
pub struct SourceParts {
    pub issue: Arc<Issue>,
    pub newsletter: Arc<Newsletter>,
    pub recipient: Recipient,
    pub context: Arc<SourceContext>,
}

/// The generic source backed by an issue entity
#[derive(Debug)]
pub struct EntitySource {
    issue: Arc<Issue>,
    newsletter: Arc<Newsletter>,
    recipient: Recipient,
    context: Arc<SourceContext>,
    language: Language,
    content: IssueContent,
    cache: ScopedCache,
    unsubscribe_url: String,
    tokens: TokenContext,
}

impl EntitySource {
    /// Resolve the translation for the recipient and prepare the token values
    ///
    /// # Errors
    ///
    /// Returns an error if the unsubscribe link cannot be signed
    pub fn new(parts: SourceParts) -> Result<Self> {
        let SourceParts {
            issue,
            newsletter,
            recipient,
            context,
        } = parts;

        let preferred = recipient
            .language
            .clone()
            .unwrap_or_else(|| issue.language.clone());
        let (language, content) = issue.translation(&preferred);
        let (language, content) = (language.clone(), content.clone());

        let cache = context.cache.scoped(
            Arc::clone(&context.policy),
            "issue",
            issue.id.0,
            language.clone(),
        );

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let unsubscribe_url = context.signer.url(
            recipient.subscriber_id.unwrap_or(SubscriberId(0)),
            newsletter.id,
            timestamp,
        )?;

        let tokens = TokenContext::new()
            .with("issue:title", content.title.as_str())
            .with("newsletter:name", newsletter.name.as_str())
            .with("subscriber:mail", recipient.mail.as_str())
            .with("subscriber:unsubscribe-url", unsubscribe_url.as_str())
            .with("site:name", context.settings.site_name.as_str())
            .with("site:url", context.settings.site_url.as_str());

        Ok(Self {
            issue,
            newsletter,
            recipient,
            context,
            language,
            content,
            cache,
            unsubscribe_url,
            tokens,
        })
    }

    fn actor(&self) -> Actor {
        Actor {
            account: self.recipient.account,
            language: self.language.clone(),
        }
    }

    fn build_body(&self, format: Format) -> Result<Arc<str>> {
        self.cache
            .text(CacheGroup::Build, &format!("body:{format}"), || {
                let html = format!(
                    "<h2>{}</h2>\n{}",
                    escape_html(&self.content.title),
                    self.content.body
                );
                match format {
                    Format::Html => Ok(html),
                    Format::Plain => html_to_text(&html, self.newsletter.hyperlinks),
                }
            })
    }

    fn build_footer(&self, format: Format) -> Result<Arc<str>> {
        self.cache
            .text(CacheGroup::Build, &format!("footer:{format}"), || {
                Ok(match format {
                    Format::Plain => PLAIN_FOOTER.to_string(),
                    Format::Html => HTML_FOOTER.to_string(),
                })
            })
    }

    /// Substitute tokens as the recipient
    ///
    /// Output that still had tokens is keyed by recipient, so a policy that
    /// allows final caching never hands one recipient's text to another.
    fn personalize(&self, key: &str, built: &str, sanitize: Sanitize) -> Result<String> {
        let replacer = &self.context.tokens;
        let key = if replacer.has_tokens(built) {
            format!("{key}:{}", self.recipient.mail.to_ascii_lowercase())
        } else {
            key.to_string()
        };

        let text = self.cache.text(CacheGroup::Final, &key, || {
            let _guard = self.context.session.impersonate(self.actor());
            replacer.replace(built, &self.tokens, sanitize)
        })?;

        Ok(text.to_string())
    }
}

const fn sanitize_for(format: Format) -> Sanitize {
    match format {
        Format::Plain => Sanitize::Raw,
        Format::Html => Sanitize::Escape,
    }
}

impl MessageSource for EntitySource {
    fn issue(&self) -> &Issue {
        &self.issue
    }

    fn newsletter(&self) -> &Newsletter {
        &self.newsletter
    }

    fn recipient(&self) -> &str {
        &self.recipient.mail
    }

    fn language(&self) -> &Language {
        &self.language
    }

    fn from_address(&self) -> &str {
        &self.newsletter.from_address
    }

    fn from_formatted(&self) -> String {
        format_address(
            &self.newsletter.from_name,
            &self.newsletter.from_address,
            self.context.settings.format_from,
        )
    }

    fn subject(&self) -> Result<String> {
        let subject = {
            let _guard = self.context.session.impersonate(self.actor());
            self.context.tokens.replace(
                &self.newsletter.subject_template,
                &self.tokens,
                Sanitize::Raw,
            )?
        };

        Ok(subject.replace(['\r', '\n'], ""))
    }

    fn body(&self, format: Format) -> Result<String> {
        let built = self.build_body(format)?;
        self.personalize(&format!("body:{format}"), &built, sanitize_for(format))
    }

    fn footer(&self, format: Format) -> Result<String> {
        let built = self.build_footer(format)?;
        self.personalize(&format!("footer:{format}"), &built, sanitize_for(format))
    }

    fn headers(&self, base: Headers) -> Result<Headers> {
        Ok(newsletter_headers(
            base,
            &self.newsletter,
            &self.from_formatted(),
            &self.unsubscribe_url,
        ))
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.cache
            .files(CacheGroup::Data, "attachments", || {
                self.content.attachments.clone()
            })
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use bulletin_common::{BracketTokens, IssueId, NewsletterId, Priority};
    use pretty_assertions::assert_eq;

    use super::*;

    fn parts(format: Format, mail: &str) -> SourceParts {
        let mut newsletter = Newsletter::new(
            NewsletterId(1),
            "Weekly",
            "Weekly Team",
            "weekly@example.org",
        );
        newsletter.format = format;

        let issue = Issue::new(
            IssueId(10),
            NewsletterId(1),
            IssueContent {
                title: "Launch\r\nday".to_string(),
                body: "<p>Hi [subscriber:mail]</p>".to_string(),
                attachments: vec![Attachment {
                    uri: "file:///tmp/a.pdf".to_string(),
                    filename: "a.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                }],
            },
        );

        let context = SourceContext::new(
            SourceSettings {
                unsubscribe_secret: "s3cret".to_string(),
                site_url: "https://news.example.org".to_string(),
                ..SourceSettings::default()
            },
            Arc::new(Session::default()),
            Arc::new(BracketTokens),
        );

        SourceParts {
            issue: Arc::new(issue),
            newsletter: Arc::new(newsletter),
            recipient: Recipient {
                subscriber_id: Some(SubscriberId(5)),
                ..Recipient::address(mail)
            },
            context: Arc::new(context),
        }
    }

    #[test]
    fn test_subject_strips_newlines() {
        let source = EntitySource::new(parts(Format::Plain, "a@example.com")).expect("source");
        assert_eq!(source.subject().expect("subject"), "[Weekly] Launchday");
    }

    #[test]
    fn test_html_body_is_escaped() {
        let source =
            EntitySource::new(parts(Format::Html, "<a>@example.com")).expect("source");
        let body = source.body(Format::Html).expect("body");
        assert!(body.starts_with("<h2>Launch\r\nday</h2>"), "{body}");
        assert!(body.contains("Hi &lt;a&gt;@example.com"), "{body}");
    }

    #[test]
    fn test_plain_footer_has_unsubscribe_link() {
        let source = EntitySource::new(parts(Format::Plain, "a@example.com")).expect("source");
        let footer = source.footer(Format::Plain).expect("footer");
        assert!(footer.starts_with("-- \nWeekly\nUnsubscribe: "), "{footer}");
        assert!(
            footer.contains("https://news.example.org/newsletter/remove/5/1/"),
            "{footer}"
        );
    }

    #[test]
    fn test_headers_without_receipt_or_priority() {
        let source = EntitySource::new(parts(Format::Plain, "a@example.com")).expect("source");
        let headers = source.headers(Headers::new()).expect("headers");

        assert_eq!(
            headers.get("From"),
            Some("Weekly Team <weekly@example.org>")
        );
        assert!(!headers.contains("Disposition-Notification-To"));
        assert!(!headers.contains("X-Priority"));
        assert!(
            headers
                .get("List-Unsubscribe")
                .is_some_and(|v| v.starts_with("<https://news.example.org/newsletter/remove/"))
        );
    }

    #[test]
    fn test_receipt_and_priority() {
        let mut parts = parts(Format::Plain, "a@example.com");
        let mut newsletter = (*parts.newsletter).clone();
        newsletter.receipt = true;
        newsletter.priority = Priority::High;
        parts.newsletter = Arc::new(newsletter);

        let source = EntitySource::new(parts).expect("source");
        let headers = source.headers(Headers::new()).expect("headers");
        assert_eq!(
            headers.get("Disposition-Notification-To"),
            Some("weekly@example.org")
        );
        assert_eq!(headers.get("Priority"), Some("urgent"));
        assert_eq!(headers.get("X-Priority"), Some("2"));
        assert_eq!(headers.get("X-MSMail-Priority"), Some("High"));
    }

    #[test]
    fn test_attachments() {
        let source = EntitySource::new(parts(Format::Plain, "a@example.com")).expect("source");
        let files = source.attachments();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.pdf");
    }
}
