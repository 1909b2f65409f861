//! QUAY reliability layer.
//!
//! Everything above the packet codec and below the client/server APIs:
//!
//! - [`StreamDeliveryState`]: per-stream reordering buffer
//! - [`Connection`] / [`ConnectionTable`]: receive-side per-peer state
//! - [`PendingSends`]: unacknowledged STREAM frames
//! - [`SenderEngine`]: chunking, pacing, retransmission, ACK matching
//! - [`Receiver`]: demultiplexing, handshake answers, ACKs, in-order delivery
//!
//! Both engines are synchronous. They poll a
//! [`DatagramTransport`](crate::core::DatagramTransport) against a
//! [`Clock`](crate::core::Clock), so the same code runs over a UDP socket and
//! in deterministic tests.

mod connection;
mod pending;
mod reassembly;
mod receiver;
mod sender;

pub use connection::{Connection, ConnectionTable};
pub use pending::{FrameKey, PendingSend, PendingSends};
pub use reassembly::StreamDeliveryState;
pub use receiver::{Delivery, Receiver, ReceiverStats};
pub use sender::{SenderConfig, SenderEngine, SenderStats};
