#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use bulletin_common::{
    AccountId, Actor, BracketTokens, Format, Headers, Issue, IssueContent, IssueId, Language,
    Newsletter, NewsletterId, Priority, Recipient, Sanitize, Session, SubscriberId, TokenContext,
    TokenError, TokenReplacer,
};
use bulletin_source::{
    CacheGroup, CachePolicyKind, EntitySource, MessageSource, SourceContext, SourceParts,
    SourceSettings, StaticCache,
};
use pretty_assertions::assert_eq;

fn newsletter() -> Newsletter {
    Newsletter::new(
        NewsletterId(1),
        "Field Notes",
        "Field Notes",
        "notes@example.org",
    )
}

fn issue() -> Issue {
    let mut issue = Issue::new(
        IssueId(3),
        NewsletterId(1),
        IssueContent {
            title: "Spring".to_string(),
            body: "<p>Dear [subscriber:mail], the <b>spring</b> issue is out.</p>".to_string(),
            attachments: Vec::new(),
        },
    );
    issue.translations.insert(
        Language::new("de"),
        IssueContent {
            title: "Frühling".to_string(),
            body: "<p>Hallo [subscriber:mail]</p>".to_string(),
            attachments: Vec::new(),
        },
    );
    issue
}

fn recipient(id: u64, mail: &str) -> Recipient {
    Recipient {
        subscriber_id: Some(SubscriberId(id)),
        ..Recipient::address(mail)
    }
}

fn context(cache: CachePolicyKind, session: Arc<Session>) -> Arc<SourceContext> {
    Arc::new(SourceContext::new(
        SourceSettings {
            cache,
            unsubscribe_secret: "secret".to_string(),
            ..SourceSettings::default()
        },
        session,
        Arc::new(BracketTokens),
    ))
}

fn source(
    context: &Arc<SourceContext>,
    newsletter: &Arc<Newsletter>,
    recipient: Recipient,
) -> EntitySource {
    EntitySource::new(SourceParts {
        issue: Arc::new(issue()),
        newsletter: Arc::clone(newsletter),
        recipient,
        context: Arc::clone(context),
    })
    .expect("source")
}

#[test]
fn anonymous_build_shares_build_but_not_final_output() {
    let context = context(CachePolicyKind::AnonymousBuild, Arc::new(Session::default()));
    let newsletter = Arc::new(newsletter());

    let first = source(&context, &newsletter, recipient(1, "ann@example.org"));
    let first_body = first.body(Format::Plain).expect("body");
    let first_footer = first.footer(Format::Plain).expect("footer");
    let after_first = context.cache.stats(CacheGroup::Build);
    assert_eq!(after_first.hits, 0);

    let second = source(&context, &newsletter, recipient(2, "bob@example.org"));
    let second_body = second.body(Format::Plain).expect("body");
    let second_footer = second.footer(Format::Plain).expect("footer");
    let after_second = context.cache.stats(CacheGroup::Build);

    assert_eq!(after_second.hits, 2);
    assert_eq!(after_second.misses, after_first.misses);
    assert_eq!(context.cache.stats(CacheGroup::Final).hits, 0);

    assert!(first_body.contains("ann@example.org"), "{first_body}");
    assert!(second_body.contains("bob@example.org"), "{second_body}");
    assert_ne!(first_body, second_body);
    assert_ne!(first_footer, second_footer);
}

#[test]
fn static_cache_keys_personal_final_output_by_recipient() {
    let context = Arc::new(
        SourceContext::new(
            SourceSettings::default(),
            Arc::new(Session::default()),
            Arc::new(BracketTokens),
        )
        .with_policy(Arc::new(StaticCache)),
    );
    let newsletter = Arc::new(newsletter());

    let ann = source(&context, &newsletter, recipient(1, "ann@example.org"));
    let bob = source(&context, &newsletter, recipient(2, "bob@example.org"));

    let ann_body = ann.body(Format::Html).expect("body");
    let bob_body = bob.body(Format::Html).expect("body");
    assert_ne!(ann_body, bob_body);

    let ann_again = source(&context, &newsletter, recipient(1, "ann@example.org"));
    assert_eq!(ann_again.body(Format::Html).expect("body"), ann_body);
    assert_eq!(context.cache.stats(CacheGroup::Final).hits, 1);
}

#[test]
fn no_cache_policy_stores_nothing() {
    let context = context(CachePolicyKind::None, Arc::new(Session::default()));
    let newsletter = Arc::new(newsletter());

    let source = source(&context, &newsletter, recipient(1, "ann@example.org"));
    source.body(Format::Plain).expect("body");
    source.footer(Format::Html).expect("footer");
    source.attachments();

    assert!(context.cache.is_empty());
}

#[test]
fn translation_follows_recipient_language() {
    let context = context(CachePolicyKind::AnonymousBuild, Arc::new(Session::default()));
    let newsletter = Arc::new(newsletter());

    let german = source(
        &context,
        &newsletter,
        Recipient {
            language: Some(Language::new("de")),
            ..recipient(1, "jo@example.de")
        },
    );
    assert_eq!(german.language().as_str(), "de");
    assert_eq!(german.subject().expect("subject"), "[Field Notes] Frühling");

    let french = source(
        &context,
        &newsletter,
        Recipient {
            language: Some(Language::new("fr")),
            ..recipient(2, "lu@example.fr")
        },
    );
    assert_eq!(french.language().as_str(), "en");
    assert_eq!(french.subject().expect("subject"), "[Field Notes] Spring");
}

#[test]
fn highest_priority_headers() {
    let context = context(CachePolicyKind::None, Arc::new(Session::default()));
    let mut newsletter = newsletter();
    newsletter.priority = Priority::Highest;
    let newsletter = Arc::new(newsletter);

    let headers = source(&context, &newsletter, recipient(1, "ann@example.org"))
        .headers(Headers::new())
        .expect("headers");

    assert_eq!(headers.get("X-Priority"), Some("1"));
    assert_eq!(headers.get("X-MSMail-Priority"), Some("Highest"));
    assert_eq!(headers.get("Priority"), Some("High"));
    assert!(!headers.contains("Disposition-Notification-To"));
    assert!(!headers.contains("X-Confirm-Reading-To"));
}

#[test]
fn unformatted_from_fallback() {
    let context = Arc::new(SourceContext::new(
        SourceSettings {
            format_from: false,
            ..SourceSettings::default()
        },
        Arc::new(Session::default()),
        Arc::new(BracketTokens),
    ));
    let newsletter = Arc::new(newsletter());

    let source = source(&context, &newsletter, recipient(1, "ann@example.org"));
    assert_eq!(source.from_formatted(), "notes@example.org");
    assert_eq!(
        source.headers(Headers::new()).expect("headers").get("From"),
        Some("notes@example.org")
    );
}

/// Replacer that records the actor it runs as and then fails
#[derive(Debug)]
struct FailingTokens {
    session: Arc<Session>,
    seen: parking_lot::Mutex<Vec<Actor>>,
}

impl TokenReplacer for FailingTokens {
    fn replace(
        &self,
        _template: &str,
        _context: &TokenContext,
        _sanitize: Sanitize,
    ) -> Result<String, TokenError> {
        self.seen.lock().push(self.session.current());
        Err(TokenError::Render("token provider crashed".to_string()))
    }

    fn has_tokens(&self, _text: &str) -> bool {
        true
    }
}

#[test]
fn failed_render_restores_previous_actor() {
    let session = Arc::new(Session::new(Actor::anonymous(Language::new("en"))));
    let tokens = Arc::new(FailingTokens {
        session: Arc::clone(&session),
        seen: parking_lot::Mutex::new(Vec::new()),
    });
    let context = Arc::new(SourceContext::new(
        SourceSettings::default(),
        Arc::clone(&session),
        Arc::clone(&tokens) as Arc<dyn TokenReplacer>,
    ));
    let newsletter = Arc::new(newsletter());

    let failing = source(
        &context,
        &newsletter,
        Recipient {
            account: Some(AccountId(42)),
            language: Some(Language::new("de")),
            ..recipient(1, "ann@example.org")
        },
    );
    assert!(failing.body(Format::Plain).is_err());
    assert!(failing.subject().is_err());

    let seen = tokens.seen.lock().clone();
    assert_eq!(
        seen[0],
        Actor {
            account: Some(AccountId(42)),
            language: Language::new("de"),
        }
    );

    assert_eq!(session.current(), Actor::anonymous(Language::new("en")));
    let next = source(&context, &newsletter, recipient(2, "bob@example.org"));
    assert_eq!(next.language().as_str(), "en");
    assert!(session.is_anonymous());
}
