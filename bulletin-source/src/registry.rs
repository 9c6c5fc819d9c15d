//! Named strategy tables.
//!
//! Message sources are chosen per issue content type and recipient resolvers
//! per newsletter, both by a stored name. Names are checked against these
//! registries when configuration is loaded, so an unknown name is a
//! configuration error rather than a failed send.

use std::{collections::BTreeMap, fmt, sync::Arc};

use bulletin_common::SubscriberStore;

use crate::{
    Result, SourceError,
    resolver::{ActiveSubscribers, RecipientResolver},
    source::{EntitySource, MessageSource, SourceParts},
};

/// Name of the generic entity-backed source
pub const DEFAULT_SOURCE: &str = "entity";

/// Name of the all-active-subscribers resolver
pub const DEFAULT_RESOLVER: &str = "active-subscribers";

/// Constructs message sources
pub trait SourceFactory: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns an error if the source cannot be prepared
    fn create(&self, parts: SourceParts) -> Result<Box<dyn MessageSource>>;
}

/// Factory for [`EntitySource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EntitySourceFactory;

impl SourceFactory for EntitySourceFactory {
    fn create(&self, parts: SourceParts) -> Result<Box<dyn MessageSource>> {
        Ok(Box::new(EntitySource::new(parts)?))
    }
}

/// Message source strategies by name
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, Arc<dyn SourceFactory>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `entity` source
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_SOURCE, Arc::new(EntitySourceFactory));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn SourceFactory>) {
        self.factories.insert(name.into(), factory);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// # Errors
    ///
    /// [`SourceError::UnknownStrategy`] if nothing is registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<dyn SourceFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::UnknownStrategy {
                kind: "message source",
                name: name.to_string(),
            })
    }
}

/// Recipient resolvers by name
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    resolvers: BTreeMap<String, Arc<dyn RecipientResolver>>,
}

impl ResolverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `active-subscribers` resolver
    #[must_use]
    pub fn with_defaults(subscribers: Arc<dyn SubscriberStore>) -> Self {
        let mut registry = Self::new();
        registry.register(
            DEFAULT_RESOLVER,
            Arc::new(ActiveSubscribers::new(subscribers)),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, resolver: Arc<dyn RecipientResolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }

    /// # Errors
    ///
    /// [`SourceError::UnknownStrategy`] if nothing is registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<dyn RecipientResolver>> {
        self.resolvers
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::UnknownStrategy {
                kind: "recipient handler",
                name: name.to_string(),
            })
    }
}
