//! Backing store implementations for the spool
//!
//! - `memory`: rows held in process memory, for tests and single-process runs
//! - `file`: one bincode file per row in a spool directory, survives restarts

pub mod file;
pub mod memory;
mod rows;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
