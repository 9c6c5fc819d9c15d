//! Rendering side of the bulletin dispatcher.
//!
//! Given an issue and a recipient, a [`MessageSource`] produces the subject,
//! body, footer, headers and attachments of one outbound message. Expensive
//! steps go through the [`cache`], and which source or recipient resolver to
//! use is looked up by name in a [`registry`].

pub mod cache;
pub mod config;
pub mod error;
pub mod headers;
pub mod html;
pub mod links;
pub mod registry;
pub mod resolver;
pub mod source;

pub use cache::{
    AnonymousBuild, CacheGroup, CachePolicy, CachePolicyKind, CacheStats, CacheStore, NoCache,
    ScopedCache, StaticCache,
};
pub use config::SourceSettings;
pub use error::{Result, SourceError};
pub use links::UnsubscribeSigner;
pub use registry::{
    DEFAULT_RESOLVER, DEFAULT_SOURCE, EntitySourceFactory, ResolverRegistry, SourceFactory,
    SourceRegistry,
};
pub use resolver::{ActiveSubscribers, RecipientResolver};
pub use source::{EntitySource, MessageSource, SourceContext, SourceParts};
