use bulletin_common::Language;
use serde::Deserialize;

use crate::cache::CachePolicyKind;

/// Rendering settings shared by every message source
///
/// ```ron
/// source: (
///     cache: AnonymousBuild,
///     format_from: true,
///     site_name: "Example News",
///     site_url: "https://news.example.org",
///     unsubscribe_secret: "change me",
///     default_language: "en",
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub cache: CachePolicyKind,

    /// Send `From` as `Name <address>`; turn off for transports that reject
    /// formatted addresses
    #[serde(default = "default_format_from")]
    pub format_from: bool,

    #[serde(default = "default_site_name")]
    pub site_name: String,

    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Key for signing unsubscribe links
    #[serde(default)]
    pub unsubscribe_secret: String,

    /// Language used for recipients without a preference
    #[serde(default)]
    pub default_language: Language,
}

const fn default_format_from() -> bool {
    true
}

fn default_site_name() -> String {
    "bulletin".to_string()
}

fn default_site_url() -> String {
    "http://localhost".to_string()
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            cache: CachePolicyKind::default(),
            format_from: default_format_from(),
            site_name: default_site_name(),
            site_url: default_site_url(),
            unsubscribe_secret: String::new(),
            default_language: Language::default(),
        }
    }
}
