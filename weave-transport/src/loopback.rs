//! Deterministic in-process transport.
//!
//! Sent messages land in a FIFO queue instead of a socket; a test drains
//! the queue and feeds each message back through its [`InboundHandler`],
//! giving fully repeatable delivery order and an easy place to drop or
//! duplicate packets on purpose.

use std::collections::VecDeque;

use tracing::debug;
use weave_core::{PeerAddress, Result};

use crate::{InboundHandler, Transport};

/// Loopback transport with a deterministic pending-message queue.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    pending: VecDeque<(PeerAddress, Vec<u8>)>,
    sent_count: usize,
    /// When nonzero, the next N sends are dropped instead of queued.
    drop_next: usize,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages handed to `send` since construction.
    pub fn sent_count(&self) -> usize {
        self.sent_count
    }

    /// Messages queued but not yet serviced.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop the next `n` sends on the floor (lossy-link simulation).
    pub fn drop_next(&mut self, n: usize) {
        self.drop_next = n;
    }

    /// Pop every queued message and deliver it through `handler`, in send
    /// order. Messages queued by the handler itself (replies) are serviced
    /// too, until the queue is empty.
    pub fn drain_and_service_io(&mut self, handler: &mut dyn InboundHandler) {
        while let Some((source, message)) = self.pending.pop_front() {
            handler.handle_message(source, message);
        }
    }

    /// Pop every queued message without delivering it.
    pub fn drain(&mut self) -> Vec<(PeerAddress, Vec<u8>)> {
        self.pending.drain(..).collect()
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, dest: PeerAddress, message: Vec<u8>) -> Result<()> {
        self.sent_count += 1;
        if self.drop_next > 0 {
            self.drop_next -= 1;
            debug!(%dest, len = message.len(), "loopback dropping message");
            return Ok(());
        }
        self.pending.push_back((dest, message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        received: Vec<Vec<u8>>,
    }

    impl InboundHandler for Recorder {
        fn handle_message(&mut self, _source: PeerAddress, message: Vec<u8>) {
            self.received.push(message);
        }
    }

    #[test]
    fn delivers_in_send_order() {
        let mut transport = LoopbackTransport::new();
        transport.send(PeerAddress::Loopback, b"a".to_vec()).unwrap();
        transport.send(PeerAddress::Loopback, b"b".to_vec()).unwrap();

        let mut rec = Recorder { received: vec![] };
        transport.drain_and_service_io(&mut rec);
        assert_eq!(rec.received, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(transport.sent_count(), 2);
    }

    #[test]
    fn drop_next_discards_messages() {
        let mut transport = LoopbackTransport::new();
        transport.drop_next(1);
        transport.send(PeerAddress::Loopback, b"lost".to_vec()).unwrap();
        transport.send(PeerAddress::Loopback, b"kept".to_vec()).unwrap();

        let mut rec = Recorder { received: vec![] };
        transport.drain_and_service_io(&mut rec);
        assert_eq!(rec.received, vec![b"kept".to_vec()]);
    }
}
