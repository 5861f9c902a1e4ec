#![forbid(unsafe_code)]

//! Weave transport layer.
//!
//! The session core only ever sees the [`Transport`] contract: fire a
//! datagram at a peer address, receive inbound datagrams as callbacks on
//! the single-threaded event loop. Concrete drivers live behind it: a
//! deterministic in-process loopback for tests and a thin UDP adapter for
//! production.

use weave_core::{PeerAddress, Result};

pub mod loopback;
pub mod udp;

pub use loopback::LoopbackTransport;
pub use udp::UdpTransport;

/// Outbound half of the transport contract.
///
/// `send` must not block the event loop; delivery status beyond local
/// submission is the reliability layer's concern.
pub trait Transport {
    fn send(&mut self, dest: PeerAddress, message: Vec<u8>) -> Result<()>;
}

/// Consumer of inbound datagrams.
pub trait InboundHandler {
    fn handle_message(&mut self, source: PeerAddress, message: Vec<u8>);
}
