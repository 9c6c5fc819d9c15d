//! Signed unsubscribe links.
//!
//! `{site_url}/newsletter/remove/{subscriber}/{newsletter}/{timestamp}/{hash}`
//! where `hash` is the first 20 hex characters of an HMAC-SHA256 over
//! `subscriber:newsletter:timestamp`.

use bulletin_common::{NewsletterId, SubscriberId};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Result, SourceError};

type HmacSha256 = Hmac<Sha256>;

const HASH_LEN: usize = 20;

/// Builds and checks unsubscribe links
#[derive(Clone)]
pub struct UnsubscribeSigner {
    site_url: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for UnsubscribeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeSigner")
            .field("site_url", &self.site_url)
            .finish_non_exhaustive()
    }
}

impl UnsubscribeSigner {
    #[must_use]
    pub fn new(site_url: &str, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    fn hash(
        &self,
        subscriber: SubscriberId,
        newsletter: NewsletterId,
        timestamp: u64,
    ) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SourceError::Render(format!("Invalid unsubscribe secret: {e}")))?;
        mac.update(format!("{subscriber}:{newsletter}:{timestamp}").as_bytes());

        let mut hash = hex::encode(mac.finalize().into_bytes());
        hash.truncate(HASH_LEN);
        Ok(hash)
    }

    /// Unsubscribe link for a subscriber, signed at `timestamp`
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Render`] if the secret cannot key the MAC
    pub fn url(
        &self,
        subscriber: SubscriberId,
        newsletter: NewsletterId,
        timestamp: u64,
    ) -> Result<String> {
        let hash = self.hash(subscriber, newsletter, timestamp)?;
        Ok(format!(
            "{}/newsletter/remove/{subscriber}/{newsletter}/{timestamp}/{hash}",
            self.site_url
        ))
    }

    /// Whether `hash` is the signature of the given link parameters
    #[must_use]
    pub fn verify(
        &self,
        subscriber: SubscriberId,
        newsletter: NewsletterId,
        timestamp: u64,
        hash: &str,
    ) -> bool {
        self.hash(subscriber, newsletter, timestamp)
            .is_ok_and(|expected| expected == hash)
    }
}
