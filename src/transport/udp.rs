//! UDP transport carrying OSC messages

use async_trait::async_trait;
use bytes::BytesMut;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use super::{osc, Datagram, Inbound, Transport, TransportError, TransportResult, MAX_DATAGRAM_SIZE};

/// [`Transport`] over a single UDP socket
///
/// `recv_from` and `send_to` both take `&self`, so one socket serves the
/// receive loop and every concurrent reply.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    /// Receive buffer, reused across packets
    read_buf: Mutex<BytesMut>,
}

impl UdpTransport {
    /// Bind a socket to the given address
    pub async fn bind(addr: SocketAddr) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            read_buf: Mutex::new(BytesMut::with_capacity(MAX_DATAGRAM_SIZE)),
        })
    }

    /// Bind an ephemeral port able to reach `peer`
    pub async fn bind_for(peer: SocketAddr) -> TransportResult<Self> {
        let ip = match peer.ip() {
            IpAddr::V4(ip) if ip.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(ip) if ip.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self::bind(SocketAddr::new(ip, 0)).await
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self) -> TransportResult<Inbound> {
        let mut buf = self.read_buf.lock().await;
        buf.clear();
        buf.reserve(MAX_DATAGRAM_SIZE);
        let (n, sender) = self.socket.recv_buf_from(&mut *buf).await?;

        let datagram = osc::decode(&buf[..n])
            .map_err(|source| TransportError::Malformed { sender, source })?;

        tracing::trace!("Received {} bytes on {} from {}", n, datagram.address, sender);
        Ok(Inbound { datagram, sender })
    }

    async fn send(&self, destination: SocketAddr, datagram: &Datagram) -> TransportResult<()> {
        let bytes = osc::encode(datagram);
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::PayloadTooLarge(bytes.len(), MAX_DATAGRAM_SIZE));
        }

        self.socket.send_to(&bytes, destination).await?;
        Ok(())
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind_for(a.local_addr().unwrap()).await.unwrap();

        let datagram = Datagram::new("/rpc/ping", r#"{"uuid":3}"#);
        b.send(a.local_addr().unwrap(), &datagram).await.unwrap();

        let inbound = a.recv().await.unwrap();
        assert_eq!(inbound.datagram, datagram);
        assert_eq!(inbound.sender, b.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_buffer_reuse_keeps_packets_apart() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind_for(a.local_addr().unwrap()).await.unwrap();

        let long = Datagram::new("/rpc/long", "y".repeat(2000));
        let short = Datagram::new("/rpc/s", "{}");
        b.send(a.local_addr().unwrap(), &long).await.unwrap();
        b.send(a.local_addr().unwrap(), &short).await.unwrap();

        assert_eq!(a.recv().await.unwrap().datagram, long);
        assert_eq!(a.recv().await.unwrap().datagram, short);
    }

    #[tokio::test]
    async fn test_malformed_datagram_reports_sender() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"not osc", a.local_addr().unwrap()).await.unwrap();

        match a.recv().await {
            Err(TransportError::Malformed { sender, .. }) => {
                assert_eq!(sender, raw.local_addr().unwrap());
            }
            other => panic!("expected malformed datagram, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let datagram = Datagram::new("/rpc/big", "x".repeat(MAX_DATAGRAM_SIZE));

        let result = a.send(a.local_addr().unwrap(), &datagram).await;
        assert!(matches!(result, Err(TransportError::PayloadTooLarge(..))));
    }
}
