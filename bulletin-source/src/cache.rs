//! Source cache.
//!
//! Rendering a body means a translation lookup, HTML reduction and token
//! replacement. Most of it is identical for every recipient of an issue, so
//! intermediate results are cached per entity and language, split into
//! groups by how personal the content is:
//!
//! - **Data**: raw extracted data such as the attachment list
//! - **Build**: rendered but not personalised
//! - **Final**: token-substituted, recipient-specific output
//!
//! What may be cached is decided by an injected [`CachePolicy`]. The store
//! itself is created once per run and shared by every source built in it,
//! so fresh sources still hit entries their predecessors wrote.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bulletin_common::{Attachment, Language, Session};
use dashmap::DashMap;
use serde::Deserialize;

/// How personal cached content is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheGroup {
    Data,
    Build,
    Final,
}

impl CacheGroup {
    const fn index(self) -> usize {
        match self {
            Self::Data => 0,
            Self::Build => 1,
            Self::Final => 2,
        }
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Build => "build",
            Self::Final => "final",
        })
    }
}

/// Decides what may be cached
pub trait CachePolicy: Send + Sync + fmt::Debug {
    fn is_cacheable(&self, group: CacheGroup, key: &str) -> bool;
}

/// Caches nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CachePolicy for NoCache {
    fn is_cacheable(&self, _group: CacheGroup, _key: &str) -> bool {
        false
    }
}

/// Caches data and build output while rendering for an anonymous actor.
///
/// Final output is never cached: it can carry per-recipient content such as
/// the unsubscribe link even when nobody is logged in.
#[derive(Debug, Clone)]
pub struct AnonymousBuild {
    session: Arc<Session>,
}

impl AnonymousBuild {
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl CachePolicy for AnonymousBuild {
    fn is_cacheable(&self, group: CacheGroup, _key: &str) -> bool {
        matches!(group, CacheGroup::Data | CacheGroup::Build) && self.session.is_anonymous()
    }
}

/// Caches every group.
///
/// Sources key final entries by recipient whenever the built text contains
/// tokens, so only token-free output is shared between recipients.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCache;

impl CachePolicy for StaticCache {
    fn is_cacheable(&self, _group: CacheGroup, _key: &str) -> bool {
        true
    }
}

/// Configured cache policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CachePolicyKind {
    None,
    #[default]
    AnonymousBuild,
    Static,
}

impl CachePolicyKind {
    #[must_use]
    pub fn build(self, session: &Arc<Session>) -> Arc<dyn CachePolicy> {
        match self {
            Self::None => Arc::new(NoCache),
            Self::AnonymousBuild => Arc::new(AnonymousBuild::new(Arc::clone(session))),
            Self::Static => Arc::new(StaticCache),
        }
    }
}

/// A cached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Text(Arc<str>),
    Files(Arc<[Attachment]>),
}

/// Full identity of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_type: &'static str,
    pub entity_id: u64,
    pub language: Language,
    pub group: CacheGroup,
    pub key: String,
}

/// Hit and miss counters for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: [AtomicU64; 3],
    misses: [AtomicU64; 3],
}

/// Process-local cache storage shared by all sources of a run.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    entries: Arc<DashMap<CacheKey, CachedValue>>,
    counters: Arc<Counters>,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the store to one entity and language under a policy
    #[must_use]
    pub fn scoped(
        &self,
        policy: Arc<dyn CachePolicy>,
        entity_type: &'static str,
        entity_id: u64,
        language: Language,
    ) -> ScopedCache {
        ScopedCache {
            store: self.clone(),
            policy,
            entity_type,
            entity_id,
            language,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self, group: CacheGroup) -> CacheStats {
        CacheStats {
            hits: self.counters.hits[group.index()].load(Ordering::Relaxed),
            misses: self.counters.misses[group.index()].load(Ordering::Relaxed),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let found = self.entries.get(key).map(|entry| entry.value().clone());
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter[key.group.index()].fetch_add(1, Ordering::Relaxed);
        found
    }
}

/// A [`CacheStore`] bound to one entity, language and policy
#[derive(Debug, Clone)]
pub struct ScopedCache {
    store: CacheStore,
    policy: Arc<dyn CachePolicy>,
    entity_type: &'static str,
    entity_id: u64,
    language: Language,
}

impl ScopedCache {
    fn key(&self, group: CacheGroup, key: &str) -> CacheKey {
        CacheKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            language: self.language.clone(),
            group,
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn is_cacheable(&self, group: CacheGroup, key: &str) -> bool {
        self.policy.is_cacheable(group, key)
    }

    /// Look an entry up; always absent when the policy forbids caching it
    #[must_use]
    pub fn get(&self, group: CacheGroup, key: &str) -> Option<CachedValue> {
        if !self.is_cacheable(group, key) {
            return None;
        }
        self.store.get(&self.key(group, key))
    }

    /// Store an entry; ignored when the policy forbids caching it
    pub fn set(&self, group: CacheGroup, key: &str, value: CachedValue) {
        if self.is_cacheable(group, key) {
            self.store.entries.insert(self.key(group, key), value);
        }
    }

    /// Cached text for `key`, rendering and storing it on a miss
    ///
    /// # Errors
    ///
    /// Propagates the error from `render`
    pub fn text<E>(
        &self,
        group: CacheGroup,
        key: &str,
        render: impl FnOnce() -> Result<String, E>,
    ) -> Result<Arc<str>, E> {
        if let Some(CachedValue::Text(text)) = self.get(group, key) {
            tracing::trace!(%group, key, entity_id = self.entity_id, "Source cache hit");
            return Ok(text);
        }

        let text: Arc<str> = Arc::from(render()?);
        self.set(group, key, CachedValue::Text(Arc::clone(&text)));
        Ok(text)
    }

    /// Cached attachment list for `key`, extracting it on a miss
    pub fn files(
        &self,
        group: CacheGroup,
        key: &str,
        extract: impl FnOnce() -> Vec<Attachment>,
    ) -> Arc<[Attachment]> {
        if let Some(CachedValue::Files(files)) = self.get(group, key) {
            return files;
        }

        let files: Arc<[Attachment]> = Arc::from(extract());
        self.set(group, key, CachedValue::Files(Arc::clone(&files)));
        files
    }
}

#[cfg(test)]
mod tests {
    use bulletin_common::{AccountId, Actor};

    use super::*;

    fn scoped(store: &CacheStore, policy: Arc<dyn CachePolicy>, id: u64) -> ScopedCache {
        store.scoped(policy, "issue", id, Language::new("en"))
    }

    #[test]
    fn test_no_cache_never_stores() {
        let store = CacheStore::new();
        let cache = scoped(&store, Arc::new(NoCache), 1);

        cache.set(CacheGroup::Build, "html", CachedValue::Text(Arc::from("x")));
        assert!(store.is_empty());
        assert_eq!(cache.get(CacheGroup::Build, "html"), None);
    }

    #[test]
    fn test_anonymous_build_policy() {
        let session = Arc::new(Session::default());
        let policy = AnonymousBuild::new(Arc::clone(&session));

        assert!(policy.is_cacheable(CacheGroup::Data, "attachments"));
        assert!(policy.is_cacheable(CacheGroup::Build, "html"));
        assert!(!policy.is_cacheable(CacheGroup::Final, "html"));

        let _guard = session.impersonate(Actor {
            account: Some(AccountId(4)),
            language: Language::new("en"),
        });
        assert!(!policy.is_cacheable(CacheGroup::Build, "html"));
    }

    #[test]
    fn test_entities_do_not_collide() {
        let store = CacheStore::new();
        let first = scoped(&store, Arc::new(StaticCache), 1);
        let second = scoped(&store, Arc::new(StaticCache), 2);

        let a = first
            .text::<()>(CacheGroup::Build, "plain", || Ok("first".to_string()))
            .expect("render");
        let b = second
            .text::<()>(CacheGroup::Build, "plain", || Ok("second".to_string()))
            .expect("render");

        assert_eq!(&*a, "first");
        assert_eq!(&*b, "second");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_shared_across_scopes_and_counted() {
        let store = CacheStore::new();
        let first = scoped(&store, Arc::new(StaticCache), 1);
        first
            .text::<()>(CacheGroup::Build, "plain", || Ok("body".to_string()))
            .expect("render");

        let fresh = scoped(&store.clone(), Arc::new(StaticCache), 1);
        let hit = fresh
            .text::<()>(CacheGroup::Build, "plain", || Err(()))
            .expect("cached");
        assert_eq!(&*hit, "body");
        assert_eq!(
            store.stats(CacheGroup::Build),
            CacheStats { hits: 1, misses: 1 }
        );
    }
}
