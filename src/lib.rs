//! oscrpc - Request/reply RPC over OSC datagrams
//!
//! A client sends an OSC message addressed to `/rpc/<procedure>` whose single
//! string argument is a JSON request body. The server resolves the address
//! against its registry, invokes the procedure and sends a correlated reply
//! to the sender on `/rpc/_reply`.
//!
//! Modules, leaves first:
//! - [`transport`] - datagram transport adapter (UDP + OSC framing)
//! - [`protocol`] - request/response records and their JSON codec
//! - [`registry`] - named procedures and their signatures
//! - [`network`] - dispatch engine, serving loop and client
//! - [`config`] - TOML configuration for the binary

pub mod config;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use network::{
    ClientConfig, ClientError, DispatchOutcome, Dispatcher, RpcClient, ServeMode, Server,
    ServerConfig, ServerError,
};
pub use protocol::{CallId, Request, Response};
pub use registry::{Args, Procedure, ProcedureError, Registry, RegistryError};
pub use transport::{Datagram, Inbound, Transport, TransportError, UdpTransport};
