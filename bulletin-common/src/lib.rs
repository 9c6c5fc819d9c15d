//! Shared building blocks for the bulletin newsletter dispatcher.
//!
//! This crate holds the data model read by the dispatch pipeline, the
//! interfaces of the collaborators the pipeline talks to (content store,
//! subscriber store, mail transport, token replacement), the acting-user
//! [`session::Session`], and the logging setup shared by every crate.

pub mod error;
pub mod headers;
pub mod logging;
pub mod memory;
pub mod message;
pub mod model;
pub mod session;
pub mod store;
pub mod tokens;

pub use error::{StoreError, TokenError, TransportError};
pub use headers::Headers;
pub use message::OutboundMessage;
pub use model::{
    AccountId, Attachment, Format, HyperlinkPolicy, Issue, IssueContent, IssueId, IssueStatus,
    Language, Newsletter, NewsletterId, OptInMode, Priority, Recipient, Subscriber, SubscriberId,
    Subscription, SubscriptionStatus,
};
pub use session::{Actor, Session, SessionGuard};
pub use store::{EntityStore, MailTransport, SubscriberQuery, SubscriberStore};
pub use tokens::{BracketTokens, Sanitize, TokenContext, TokenReplacer};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
