//! UDP driver.
//!
//! Single socket bound with address reuse when supported; a single-threaded
//! receive pump dispatches datagrams to an [`InboundHandler`] so the session
//! core keeps its cooperative event-loop model.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use weave_core::{Error, PeerAddress, Result};

use crate::{InboundHandler, Transport};

/// Maximum datagram size accepted from the wire.
const MAX_DATAGRAM: usize = 1280;

/// UDP transport adapter.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind on `[::]:port` with address reuse when possible.
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
        let socket = socket2::Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        socket.set_reuse_port(true)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let std_sock: std::net::UdpSocket = socket.into();
        std_sock.set_nonblocking(true)?;
        Ok(Self {
            socket: UdpSocket::from_std(std_sock)?,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive pump: awaits datagrams and hands each to `handler`. Runs
    /// until the socket errors out.
    pub async fn service(&self, handler: &mut dyn InboundHandler) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            debug!(%from, len, "udp datagram received");
            handler.handle_message(PeerAddress::udp(from), buf[..len].to_vec());
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, dest: PeerAddress, message: Vec<u8>) -> Result<()> {
        let PeerAddress::Udp(addr) = dest else {
            return Err(Error::IncorrectState("udp transport given non-udp peer"));
        };
        if message.len() > MAX_DATAGRAM {
            return Err(Error::MessageTooLong);
        }
        match self.socket.try_send_to(&message, addr) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(%addr, error = %e, "udp send failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        received: Vec<(PeerAddress, Vec<u8>)>,
    }

    impl InboundHandler for Recorder {
        fn handle_message(&mut self, source: PeerAddress, message: Vec<u8>) {
            self.received.push((source, message));
        }
    }

    #[tokio::test]
    async fn sends_datagram_between_sockets() {
        let a = UdpTransport::bind(0).await.unwrap();
        let b = UdpTransport::bind(0).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let mut a = a;
        let dest = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), b_addr.port());
        a.send(PeerAddress::udp(dest), b"ping".to_vec()).unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = b.socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
    }

    #[test]
    fn recorder_is_inbound_handler() {
        // Compile-time check that the handler trait stays object safe.
        let mut rec = Recorder { received: vec![] };
        let handler: &mut dyn InboundHandler = &mut rec;
        handler.handle_message(PeerAddress::Loopback, b"x".to_vec());
        assert_eq!(rec.received.len(), 1);
    }
}
