//! HTML to plain text reduction.

use std::sync::LazyLock;

use bulletin_common::HyperlinkPolicy;
use regex::{Captures, Regex};

use crate::{Result, SourceError};

/// Line width of the plain text rendering
pub const TEXT_WIDTH: usize = 78;

#[allow(clippy::expect_used)]
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#)
        .expect("valid anchor pattern")
});

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));

/// Reduce HTML to plain text, keeping link targets according to `links`
///
/// # Errors
///
/// Returns [`SourceError::Render`] if the document cannot be parsed
pub fn html_to_text(html: &str, links: HyperlinkPolicy) -> Result<String> {
    let html = match links {
        HyperlinkPolicy::Footnotes => std::borrow::Cow::Borrowed(html),
        HyperlinkPolicy::Inline => inline_links(html),
    };

    let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .map_err(|e| SourceError::Render(format!("HTML reduction failed: {e}")))?;

    Ok(text.trim_end().to_string())
}

/// Rewrite anchors to `text (href)` so the target stays in the running text
fn inline_links(html: &str) -> std::borrow::Cow<'_, str> {
    ANCHOR.replace_all(html, |captures: &Captures<'_>| {
        let href = &captures[1];
        let text = TAG.replace_all(&captures[2], "");
        let text = text.trim();

        if text.is_empty() || text == href {
            href.to_string()
        } else {
            format!("{text} ({href})")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_links() {
        let text = html_to_text(
            r#"<p>Read <a href="https://example.com/post">the post</a> today.</p>"#,
            HyperlinkPolicy::Inline,
        )
        .expect("render");

        assert!(text.contains("the post (https://example.com/post)"), "{text}");
    }

    #[test]
    fn test_inline_bare_link() {
        let rewritten = inline_links(r#"<a href="https://a.example">https://a.example</a>"#);
        assert_eq!(rewritten, "https://a.example");
    }

    #[test]
    fn test_footnote_links_keep_target() {
        let text = html_to_text(
            r#"<p>Read <a href="https://example.com/post">the post</a>.</p>"#,
            HyperlinkPolicy::Footnotes,
        )
        .expect("render");

        assert!(text.contains("the post"), "{text}");
        assert!(text.contains("https://example.com/post"), "{text}");
        assert!(!text.contains("<a"), "{text}");
    }
}
