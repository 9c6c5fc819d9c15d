//! The mail spool: one row per (issue, recipient) pair.
//!
//! Rows move `Pending -> InFlight -> {Done, Error}`. A batch is taken with an
//! atomic [`BackingStore::claim`]; rows that stay in flight longer than the
//! configured expiration are considered abandoned and can be claimed again.

pub mod backends;
pub mod config;
pub mod error;
pub mod row;
pub mod r#trait;
pub mod types;

pub use backends::{FileBackingStore, FileBackingStoreBuilder, MemoryBackingStore};
pub use config::{SpoolBackend, SpoolConfig};
pub use error::{Result, SpoolError};
pub use row::{RowResult, RowStatus, SpoolFilter, SpoolRow};
pub use r#trait::BackingStore;
pub use types::SpoolRowId;
