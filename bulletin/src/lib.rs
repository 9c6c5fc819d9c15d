//! Wires configuration, fixtures and a transport to the bulletin dispatcher.

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

pub mod controller;
pub mod fixtures;
pub mod transport;
