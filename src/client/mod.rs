//! QUAY Protocol - Client Library
//!
//! High-level API for QUAY clients.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
