//! QUAY Protocol - Security Layer
//!
//! - [`dh`]: finite-field Diffie-Hellman (RFC 3526 2048-bit MODP, g = 2)
//! - [`aead`]: ChaCha20-Poly1305 with a random per-datagram nonce
//! - [`handshake`]: INIT/ACCEPT exchange and 0-RTT keying
//! - [`keystore`]: cached peer values and the server's long-term key
//!
//! Key material types zeroize themselves on drop.

pub mod aead;
pub mod dh;
pub mod handshake;
pub mod keystore;

pub use aead::{open, seal, SessionKey};
pub use dh::{DhKeyPair, SharedSecret};
pub use handshake::{Initiator, Responder, Session, ZeroRttInitiator};
