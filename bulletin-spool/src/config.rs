use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::BackingStore,
};

/// Where spool rows are kept
///
/// File-backed spool in RON config:
/// ```ron
/// backend: File(path: "/var/spool/bulletin"),
/// ```
///
/// Memory-backed spool for testing, lost on restart:
/// ```ron
/// backend: Memory,
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum SpoolBackend {
    #[default]
    Memory,
    File { path: PathBuf },
}

/// Configuration for the spool
///
/// ```ron
/// Bulletin (
///     spool: (
///         backend: File(path: "/var/spool/bulletin"),
///         expiration_secs: 7200,
///         retention_secs: 604800,
///         capacity: Some(100000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    #[serde(default)]
    pub backend: SpoolBackend,

    /// Seconds a claimed row stays in flight before it may be claimed again.
    /// Must exceed the worst-case duration of a tick to avoid duplicate sends.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,

    /// Seconds terminal rows are kept before being purged (0 = next purge)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Maximum number of rows to hold (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

const fn default_expiration_secs() -> u64 {
    2 * 60 * 60
}

const fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            backend: SpoolBackend::default(),
            expiration_secs: default_expiration_secs(),
            retention_secs: default_retention_secs(),
            capacity: None,
        }
    }
}

impl SpoolConfig {
    #[must_use]
    pub const fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Build the backing store described by this configuration
    ///
    /// # Errors
    /// Returns an error if a file spool's path is invalid or its rows
    /// cannot be loaded
    pub fn into_backing_store(&self) -> crate::Result<Arc<dyn BackingStore>> {
        Ok(match &self.backend {
            SpoolBackend::Memory => {
                let store = self
                    .capacity
                    .map_or_else(MemoryBackingStore::new, MemoryBackingStore::with_capacity);
                Arc::new(store.with_expiration(self.expiration()))
            }
            SpoolBackend::File { path } => Arc::new(
                FileBackingStore::builder()
                    .path(path.clone())
                    .capacity(self.capacity)
                    .expiration(self.expiration())
                    .build()?,
            ),
        })
    }
}
