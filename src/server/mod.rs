//! QUAY Protocol - Server Library
//!
//! High-level API for QUAY servers.

#[allow(clippy::module_inception)]
mod server;

pub use server::*;
