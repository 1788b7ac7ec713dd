//! Transport module - Datagram send/receive primitive
//!
//! The dispatch engine only sees [`Datagram`]s: an address (the routing
//! attribute) plus an opaque text payload. How those are framed on the wire
//! is the adapter's business; [`UdpTransport`] frames them as OSC messages.

mod osc;
mod udp;

pub use osc::*;
pub use udp::*;

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed datagram from {sender}: {source}")]
    Malformed {
        sender: SocketAddr,
        #[source]
        source: OscError,
    },

    #[error("Datagram too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Whether a receive loop can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::Malformed { .. } | TransportError::PayloadTooLarge(..) => true,
            // ICMP port-unreachable for an earlier reply shows up here on some platforms
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
        }
    }
}

/// An addressed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Routing attribute, e.g. `/rpc/add`
    pub address: String,
    /// Opaque text body
    pub payload: String,
}

impl Datagram {
    pub fn new(address: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            payload: payload.into(),
        }
    }
}

/// A datagram together with the address it came from
#[derive(Debug, Clone)]
pub struct Inbound {
    pub datagram: Datagram,
    pub sender: SocketAddr,
}

/// Message-oriented, connectionless transport
///
/// `send` must be safe to call from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait for the next datagram
    async fn recv(&self) -> TransportResult<Inbound>;

    /// Fire-and-forget send, no delivery acknowledgment
    async fn send(&self, destination: SocketAddr, datagram: &Datagram) -> TransportResult<()>;

    /// Address this transport is bound to
    fn local_addr(&self) -> TransportResult<SocketAddr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let malformed = TransportError::Malformed {
            sender: "127.0.0.1:9000".parse().unwrap(),
            source: OscError::Empty,
        };
        assert!(malformed.is_recoverable());

        let reset = TransportError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(reset.is_recoverable());

        let denied = TransportError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!denied.is_recoverable());
    }
}
