//! Data model read by the dispatch pipeline.
//!
//! Issues, newsletters and subscribers are owned by the content-authoring
//! and subscription subsystems. The dispatcher only reads them, apart from
//! the two derived issue fields (`status` and `sent_count`) it writes back
//! through [`crate::EntityStore`].

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of an issue (one piece of content to mail out)
    IssueId
);
numeric_id!(
    /// Identifier of a newsletter channel
    NewsletterId
);
numeric_id!(
    /// Identifier of a subscriber record
    SubscriberId
);
numeric_id!(
    /// Identifier of a site account a subscriber may be linked to
    AccountId
);

/// Language code such as `en` or `de`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::new("en")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mail body format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[default]
    Plain,
    Html,
}

impl Format {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mail priority, mapped onto the `Priority`/`X-Priority`/`X-MSMail-Priority`
/// header triple. `None` emits no priority headers at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    None,
    Highest,
    High,
    Normal,
    Low,
    Lowest,
}

/// How hyperlinks survive the HTML to plain text reduction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HyperlinkPolicy {
    /// `text (https://...)` in the running text
    Inline,
    /// `[text][1]` in the running text with a numbered list of targets below
    #[default]
    Footnotes,
}

/// Opt-in behaviour of a newsletter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptInMode {
    /// Subscribing takes effect immediately
    Single,
    /// Subscribing leaves the subscription unconfirmed until confirmed by mail
    #[default]
    Double,
    /// Subscriptions are managed by administrators only
    Hidden,
}

/// Derived send state of an issue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueStatus {
    #[default]
    NotSent,
    /// Rows exist in the spool for this issue
    Pending,
    /// No pending rows remain
    Ready,
    /// Queueing is deferred until the issue is published
    SendOnPublish,
}

fn default_subject_template() -> String {
    "[[newsletter:name]] [issue:title]".to_string()
}

fn default_recipient_handler() -> String {
    "active-subscribers".to_string()
}

/// A mailing list channel with its own format and sender identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: NewsletterId,
    pub name: String,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub priority: Priority,
    /// Request a read receipt from recipients
    #[serde(default)]
    pub receipt: bool,
    pub from_name: String,
    pub from_address: String,
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    #[serde(default)]
    pub hyperlinks: HyperlinkPolicy,
    #[serde(default)]
    pub opt_inout: OptInMode,
    /// Name of the recipient resolver strategy for this newsletter
    #[serde(default = "default_recipient_handler")]
    pub recipient_handler: String,
}

impl Newsletter {
    /// Create a newsletter with default format, priority and templates
    #[must_use]
    pub fn new(
        id: NewsletterId,
        name: impl Into<String>,
        from_name: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            format: Format::default(),
            priority: Priority::default(),
            receipt: false,
            from_name: from_name.into(),
            from_address: from_address.into(),
            subject_template: default_subject_template(),
            hyperlinks: HyperlinkPolicy::default(),
            opt_inout: OptInMode::default(),
            recipient_handler: default_recipient_handler(),
        }
    }
}

/// A file attached to an issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub uri: String,
    pub filename: String,
    pub mime_type: String,
}

/// Localised content of an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContent {
    pub title: String,
    /// HTML body
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

fn default_content_type() -> String {
    "article".to_string()
}

/// One piece of content designated to be mailed to a newsletter's subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub newsletter_id: NewsletterId,
    /// Content type, used to pick the message source strategy
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Source language of [`Issue::content`]
    #[serde(default)]
    pub language: Language,
    pub content: IssueContent,
    #[serde(default)]
    pub translations: BTreeMap<Language, IssueContent>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub status: IssueStatus,
    #[serde(default)]
    pub sent_count: u64,
}

impl Issue {
    #[must_use]
    pub fn new(id: IssueId, newsletter_id: NewsletterId, content: IssueContent) -> Self {
        Self {
            id,
            newsletter_id,
            content_type: default_content_type(),
            language: Language::default(),
            content,
            translations: BTreeMap::new(),
            published: true,
            status: IssueStatus::default(),
            sent_count: 0,
        }
    }

    /// Pick the content for a preferred language.
    ///
    /// Falls back to the source language when no translation exists, and
    /// reports which language was actually used.
    #[must_use]
    pub fn translation(&self, preferred: &Language) -> (&Language, &IssueContent) {
        if *preferred == self.language {
            return (&self.language, &self.content);
        }

        self.translations
            .get_key_value(preferred)
            .unwrap_or((&self.language, &self.content))
    }
}

/// Subscription state for one newsletter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
    #[default]
    Unconfirmed,
}

/// A subscriber's state for one newsletter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub newsletter_id: NewsletterId,
    pub status: SubscriptionStatus,
    /// Where the change came from (`website`, `import`, `admin`, ...)
    #[serde(default)]
    pub source: String,
    /// Unix timestamp of the last status change
    #[serde(default)]
    pub timestamp: u64,
}

/// An email identity with per-newsletter subscription status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub mail: String,
    #[serde(default)]
    pub account: Option<AccountId>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

const fn default_true() -> bool {
    true
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Subscriber {
    #[must_use]
    pub fn new(id: SubscriberId, mail: impl Into<String>) -> Self {
        Self {
            id,
            mail: mail.into(),
            account: None,
            active: true,
            language: Language::default(),
            subscriptions: Vec::new(),
        }
    }

    /// A transient subscriber for an address with no stored record, used for
    /// test sends. It carries id 0 and no subscriptions.
    #[must_use]
    pub fn anonymous(mail: impl Into<String>, language: Language) -> Self {
        Self {
            language,
            ..Self::new(SubscriberId(0), mail)
        }
    }

    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    #[must_use]
    pub fn subscription(&self, newsletter: NewsletterId) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|subscription| subscription.newsletter_id == newsletter)
    }

    #[must_use]
    pub fn is_subscribed(&self, newsletter: NewsletterId) -> bool {
        self.subscription(newsletter)
            .is_some_and(|subscription| subscription.status == SubscriptionStatus::Subscribed)
    }

    /// Record a subscription state, replacing any previous state for the same
    /// newsletter so each newsletter appears at most once.
    pub fn set_status(
        &mut self,
        newsletter: NewsletterId,
        status: SubscriptionStatus,
        source: impl Into<String>,
    ) {
        let source = source.into();
        let timestamp = unix_now();

        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.newsletter_id == newsletter)
        {
            existing.status = status;
            existing.source = source;
            existing.timestamp = timestamp;
        } else {
            self.subscriptions.push(Subscription {
                newsletter_id: newsletter,
                status,
                source,
                timestamp,
            });
        }
    }

    pub fn subscribe(&mut self, newsletter: NewsletterId, source: impl Into<String>) {
        self.set_status(newsletter, SubscriptionStatus::Subscribed, source);
    }

    pub fn unsubscribe(&mut self, newsletter: NewsletterId, source: impl Into<String>) {
        self.set_status(newsletter, SubscriptionStatus::Unsubscribed, source);
    }

    /// Snapshot of this subscriber as a spool recipient
    #[must_use]
    pub fn recipient(&self) -> Recipient {
        Recipient {
            mail: self.mail.clone(),
            subscriber_id: Some(self.id),
            account: self.account,
            language: Some(self.language.clone()),
        }
    }
}

/// A resolved recipient, stored with each spool row so the subscriber does
/// not need to be looked up again at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub mail: String,
    #[serde(default)]
    pub subscriber_id: Option<SubscriberId>,
    #[serde(default)]
    pub account: Option<AccountId>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl Recipient {
    /// A recipient known only by address
    #[must_use]
    pub fn address(mail: impl Into<String>) -> Self {
        Self {
            mail: mail.into(),
            subscriber_id: None,
            account: None,
            language: None,
        }
    }
}
