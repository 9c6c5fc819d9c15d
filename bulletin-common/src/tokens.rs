//! Placeholder substitution for subjects, bodies and footers.
//!
//! Templates carry `[type:name]` tokens. The dispatcher fills a
//! [`TokenContext`] per recipient and hands it to a [`TokenReplacer`].

use std::{collections::BTreeMap, sync::LazyLock};

use regex::{Captures, Regex};

use crate::TokenError;

#[allow(clippy::expect_used)]
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([a-z][a-z0-9_-]*):([a-z0-9][a-z0-9_:-]*)\]").expect("valid token pattern")
});

/// Whether replacement values are HTML-escaped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sanitize {
    #[default]
    Escape,
    /// Insert values untouched, for plain text or already sanitised HTML
    Raw,
}

/// Values available to token replacement, keyed by `type:name`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenContext {
    values: BTreeMap<String, String>,
}

impl TokenContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(token, value);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.values.insert(token.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }
}

/// Substitutes tokens in a template
pub trait TokenReplacer: Send + Sync + std::fmt::Debug {
    /// Replace every known token in `template` with its value from `context`
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the template cannot be rendered
    fn replace(
        &self,
        template: &str,
        context: &TokenContext,
        sanitize: Sanitize,
    ) -> Result<String, TokenError>;

    /// Whether `text` still contains anything this replacer would substitute
    fn has_tokens(&self, text: &str) -> bool;
}

/// The built-in `[type:name]` replacer. Unknown tokens are left in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketTokens;

impl TokenReplacer for BracketTokens {
    fn replace(
        &self,
        template: &str,
        context: &TokenContext,
        sanitize: Sanitize,
    ) -> Result<String, TokenError> {
        let replaced = TOKEN.replace_all(template, |captures: &Captures<'_>| {
            let key = format!("{}:{}", &captures[1], &captures[2]);
            match (context.get(&key), sanitize) {
                (Some(value), Sanitize::Escape) => escape_html(value),
                (Some(value), Sanitize::Raw) => value.to_string(),
                (None, _) => captures[0].to_string(),
            }
        });

        Ok(replaced.into_owned())
    }

    fn has_tokens(&self, text: &str) -> bool {
        TOKEN.is_match(text)
    }
}

/// Escape the characters that are significant in HTML text and attributes
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TokenContext {
        TokenContext::new()
            .with("newsletter:name", "Weekly")
            .with("issue:title", "Fish & Chips")
    }

    #[test]
    fn test_subject_template() {
        let subject = BracketTokens
            .replace(
                "[[newsletter:name]] [issue:title]",
                &context(),
                Sanitize::Raw,
            )
            .unwrap();
        assert_eq!(subject, "[Weekly] Fish & Chips");
    }

    #[test]
    fn test_escape_mode() {
        let body = BracketTokens
            .replace("<h1>[issue:title]</h1>", &context(), Sanitize::Escape)
            .unwrap();
        assert_eq!(body, "<h1>Fish &amp; Chips</h1>");
    }

    #[test]
    fn test_unknown_tokens_left_alone() {
        let text = BracketTokens
            .replace("Hi [user:name], [link]", &context(), Sanitize::Raw)
            .unwrap();
        assert_eq!(text, "Hi [user:name], [link]");
    }

    #[test]
    fn test_has_tokens() {
        assert!(BracketTokens.has_tokens("Unsubscribe: [subscriber:unsubscribe-url]"));
        assert!(!BracketTokens.has_tokens("[1] https://example.com"));
        assert!(!BracketTokens.has_tokens("plain text"));
    }
}
