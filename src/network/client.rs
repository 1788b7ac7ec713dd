//! RPC Client
//!
//! Sends requests to a server and waits for the reply carrying the same
//! correlation id. One call is in flight per client at a time; replies that
//! do not match are skipped.

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::ClientConfig;
use crate::protocol::{
    decode_response, encode_request, procedure_address, CallId, EncodeError, Request, Response,
    INTROSPECTION_ADDRESS, REPLY_ADDRESS,
};
use crate::transport::{Datagram, Transport, TransportError, UdpTransport};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Remote fault: {0}")]
    Fault(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// RPC Client
pub struct RpcClient {
    /// Local socket replies arrive on
    transport: UdpTransport,
    /// Server address
    server: SocketAddr,
    /// Reply timeout
    timeout: Duration,
    /// Next correlation id
    next_uuid: AtomicI64,
    /// Serializes calls so replies are not stolen
    call_lock: Mutex<()>,
}

impl RpcClient {
    /// Create a client talking to `server`
    pub async fn connect(server: SocketAddr, timeout: Duration) -> ClientResult<Self> {
        let transport = UdpTransport::bind_for(server).await?;
        tracing::debug!(
            "Client bound to {} for server {}",
            transport.local_addr()?,
            server
        );

        Ok(Self {
            transport,
            server,
            timeout,
            next_uuid: AtomicI64::new(1),
            call_lock: Mutex::new(()),
        })
    }

    /// Create a client from configuration, resolving the server host name
    pub async fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let server = super::resolve_host(&config.server, config.port).await?;
        Self::connect(server, Duration::from_millis(config.timeout_ms)).await
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> ClientResult<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Send a request to `address` and wait for its reply
    pub async fn request(&self, address: &str, arguments: Vec<String>) -> ClientResult<Response> {
        let _guard = self.call_lock.lock().await;

        let uuid = CallId::from(self.next_uuid.fetch_add(1, Ordering::SeqCst));
        let request = Request::new(uuid.clone(), address, arguments);
        let payload = encode_request(&request)?;

        tracing::debug!("Sending {:?} to {}", request, self.server);
        self.transport
            .send(self.server, &Datagram::new(address, payload))
            .await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let inbound = match tokio::time::timeout_at(deadline, self.transport.recv()).await {
                Ok(Ok(inbound)) => inbound,
                Ok(Err(e)) if e.is_recoverable() => {
                    tracing::debug!("Ignoring datagram: {}", e);
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(ClientError::Timeout(self.timeout)),
            };

            if inbound.datagram.address != REPLY_ADDRESS {
                tracing::debug!("Ignoring message on {}", inbound.datagram.address);
                continue;
            }

            match decode_response(&inbound.datagram.payload) {
                Ok(response) if response.uuid == uuid => return Ok(response),
                Ok(response) => tracing::debug!("Skipping stale reply {}", response.uuid),
                Err(e) => tracing::warn!("Ignoring malformed reply from {}: {}", inbound.sender, e),
            }
        }
    }

    /// Call a procedure by name
    pub async fn call(&self, name: &str, arguments: Vec<String>) -> ClientResult<Value> {
        let response = self.request(&procedure_address(name), arguments).await?;
        match response.fault {
            Some(fault) => Err(ClientError::Fault(fault)),
            None => Ok(response.response),
        }
    }

    /// Signatures of every procedure the server has registered
    pub async fn list_procedures(&self) -> ClientResult<Vec<String>> {
        let response = self.request(INTROSPECTION_ADDRESS, Vec::new()).await?;
        if let Some(fault) = response.fault {
            return Err(ClientError::Fault(fault));
        }

        serde_json::from_value(response.response)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_call_times_out_without_reply() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = RpcClient::connect(silent.local_addr().unwrap(), Duration::from_millis(200))
            .await
            .unwrap();

        let result = client.call("anything", Vec::new()).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_skips_foreign_and_stale_replies() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let client = RpcClient::connect(server.local_addr().unwrap(), Duration::from_secs(2))
            .await
            .unwrap();

        let responder = tokio::spawn(async move {
            let inbound = server.recv().await.unwrap();
            assert_eq!(inbound.datagram.address, "/rpc/add");
            let request: Value = serde_json::from_str(&inbound.datagram.payload).unwrap();
            let uuid = request["uuid"].as_i64().unwrap();

            let noise = [
                Datagram::new("/rpc/other", "{}"),
                Datagram::new(REPLY_ADDRESS, "not json"),
                Datagram::new(
                    REPLY_ADDRESS,
                    json!({"uuid": uuid + 100, "response": 0, "fault": null}).to_string(),
                ),
                Datagram::new(
                    REPLY_ADDRESS,
                    json!({"uuid": uuid, "response": 5, "fault": null}).to_string(),
                ),
            ];
            for datagram in &noise {
                server.send(inbound.sender, datagram).await.unwrap();
            }
        });

        let value = client.call("add", vec!["2".into(), "3".into()]).await.unwrap();
        assert_eq!(value, json!(5));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_correlation_ids_increase() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let client = RpcClient::connect(server.local_addr().unwrap(), Duration::from_millis(100))
            .await
            .unwrap();

        let _ = client.call("a", Vec::new()).await;
        let _ = client.call("b", Vec::new()).await;

        let first = server.recv().await.unwrap();
        let second = server.recv().await.unwrap();
        let uuid = |inbound: &crate::transport::Inbound| {
            serde_json::from_str::<Value>(&inbound.datagram.payload).unwrap()["uuid"]
                .as_i64()
                .unwrap()
        };
        assert_eq!(uuid(&second), uuid(&first) + 1);
    }
}
