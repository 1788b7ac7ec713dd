//! Protocol module - Defines the request/reply protocol
//!
//! Every packet is one OSC message:
//! - the address pattern names the procedure (`/rpc/<name>`)
//! - the single string argument holds a JSON body
//!
//! Requests carry `{"uuid", "arguments"}`, replies carry
//! `{"uuid", "response", "fault"}` and always arrive on [`REPLY_ADDRESS`].

mod codec;
mod message;

pub use codec::*;
pub use message::*;

/// Default port for the RPC server
pub const DEFAULT_PORT: u16 = 8000;

/// Default interface for the RPC server
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Namespace every procedure address lives under
pub const ADDRESS_PREFIX: &str = "/rpc/";

/// Reserved address that lists registered procedures
pub const INTROSPECTION_ADDRESS: &str = "/rpc/_get_methods";

/// Reserved address all replies are delivered on
pub const REPLY_ADDRESS: &str = "/rpc/_reply";

/// Build the address a procedure is called on
pub fn procedure_address(name: &str) -> String {
    format!("{}{}", ADDRESS_PREFIX, name)
}

/// Extract the procedure name from an address, if it is in the RPC namespace
pub fn procedure_name(address: &str) -> Option<&str> {
    address
        .strip_prefix(ADDRESS_PREFIX)
        .filter(|name| !name.is_empty())
}
