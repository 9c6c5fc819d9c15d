//! Sender formatting and newsletter header composition.

use base64::{Engine, engine::general_purpose::STANDARD};
use bulletin_common::{Headers, Newsletter, Priority};

/// `Priority`, `X-Priority` and `X-MSMail-Priority` values
pub type PriorityHeaders = (&'static str, &'static str, &'static str);

/// Header values for a priority, `None` when no priority headers are sent
#[must_use]
pub const fn priority_values(priority: Priority) -> Option<PriorityHeaders> {
    match priority {
        Priority::None => None,
        Priority::Highest => Some(("High", "1", "Highest")),
        Priority::High => Some(("urgent", "2", "High")),
        Priority::Normal => Some(("normal", "3", "Normal")),
        Priority::Low => Some(("non-urgent", "4", "Low")),
        Priority::Lowest => Some(("non-urgent", "5", "Lowest")),
    }
}

/// Encode a display name for a header per RFC 2047 when it is not plain ASCII
#[must_use]
pub fn encode_display_name(name: &str) -> String {
    if name.is_ascii() {
        if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) {
            format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            name.to_string()
        }
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(name.as_bytes()))
    }
}

/// `Name <address>`, or the bare address when formatting is off or there is
/// no name to show
#[must_use]
pub fn format_address(name: &str, address: &str, formatted: bool) -> String {
    let name = name.trim();
    if !formatted || name.is_empty() {
        return address.to_string();
    }

    format!("{} <{address}>", encode_display_name(name))
}

/// Merge the newsletter headers into `base`
///
/// Always sets `From`, `List-Unsubscribe` and `Precedence: bulk`; adds read
/// receipt and priority headers when the newsletter asks for them.
#[must_use]
pub fn newsletter_headers(
    mut base: Headers,
    newsletter: &Newsletter,
    from: &str,
    unsubscribe_url: &str,
) -> Headers {
    base.set("From", from);
    base.set("List-Unsubscribe", format!("<{unsubscribe_url}>"));
    base.set("Precedence", "bulk");

    if newsletter.receipt {
        base.set("Disposition-Notification-To", newsletter.from_address.as_str());
        base.set("X-Confirm-Reading-To", newsletter.from_address.as_str());
    }

    if let Some((priority, x_priority, ms_priority)) = priority_values(newsletter.priority) {
        base.set("Priority", priority);
        base.set("X-Priority", x_priority);
        base.set("X-MSMail-Priority", ms_priority);
    }

    base
}

#[cfg(test)]
mod tests {
    use bulletin_common::NewsletterId;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_format_address() {
        assert_eq!(
            format_address("Weekly News", "news@example.org", true),
            "Weekly News <news@example.org>"
        );
        assert_eq!(
            format_address("Weekly News", "news@example.org", false),
            "news@example.org"
        );
        assert_eq!(format_address("  ", "news@example.org", true), "news@example.org");
        assert_eq!(
            format_address("News, Weekly", "news@example.org", true),
            "\"News, Weekly\" <news@example.org>"
        );
        assert_eq!(
            format_address("Nyhetsbrev Ø", "news@example.org", true),
            "=?utf-8?B?TnloZXRzYnJldiDDmA==?= <news@example.org>"
        );
    }

    #[test]
    fn test_priority_none_adds_nothing() {
        let newsletter = Newsletter::new(NewsletterId(1), "N", "N", "n@example.org");
        let headers = newsletter_headers(Headers::new(), &newsletter, "n@example.org", "u");

        assert!(!headers.contains("X-Priority"));
        assert!(!headers.contains("Priority"));
        assert_eq!(headers.get("Precedence"), Some("bulk"));
        assert_eq!(headers.get("List-Unsubscribe"), Some("<u>"));
    }

    #[test]
    fn test_priority_lowest() {
        let mut newsletter = Newsletter::new(NewsletterId(1), "N", "N", "n@example.org");
        newsletter.priority = Priority::Lowest;
        let headers = newsletter_headers(Headers::new(), &newsletter, "n@example.org", "u");

        assert_eq!(headers.get("Priority"), Some("non-urgent"));
        assert_eq!(headers.get("X-Priority"), Some("5"));
        assert_eq!(headers.get("X-MSMail-Priority"), Some("Lowest"));
    }

    #[test]
    fn test_base_headers_kept() {
        let newsletter = Newsletter::new(NewsletterId(1), "N", "N", "n@example.org");
        let mut base = Headers::new();
        base.set("X-Mailer", "bulletin");
        base.set("From", "someone@else.example");

        let headers = newsletter_headers(base, &newsletter, "n@example.org", "u");
        assert_eq!(headers.get("X-Mailer"), Some("bulletin"));
        assert_eq!(headers.get("From"), Some("n@example.org"));
    }
}
