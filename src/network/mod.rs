//! Network module - Serves and calls procedures over the transport
//!
//! Provides:
//! - Dispatcher running the request/reply state machine per packet
//! - Server owning the receive loop
//! - Client for correlated calls

mod client;
mod dispatch;
mod server;

pub use client::*;
pub use dispatch::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::protocol::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT};

/// How the receive loop hands packets to the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServeMode {
    /// Dispatch each packet before receiving the next
    Inline,
    /// Spawn one task per packet
    #[default]
    TaskPerPacket,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Packet scheduling policy
    #[serde(default)]
    pub mode: ServeMode,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            mode: ServeMode::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.bind_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host name or IP address
    #[serde(default = "default_bind_address")]
    pub server: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long to wait for a reply in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_bind_address(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let mut addrs = lookup_host((host, port)).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
