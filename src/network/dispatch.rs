//! Dispatch engine
//!
//! Runs the per-packet protocol:
//! `Received -> Decoded -> Resolved -> Invoked -> Replied`, or `Dropped` when
//! the body cannot be decoded. Every failure after decoding becomes a faulted
//! reply, including a result too large for one datagram; decode failures are
//! only logged.

use serde_json::Value;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::protocol::{
    decode_request, encode_response, procedure_name, DecodeError, EncodeError, Request, Response,
    INTROSPECTION_ADDRESS, REPLY_ADDRESS,
};
use crate::registry::{Args, Procedure, ProcedureError, Registry};
use crate::transport::{Datagram, Inbound, Transport, TransportError};

/// Errors raised while running a resolved procedure
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error(transparent)]
    Procedure(#[from] ProcedureError),

    #[error("procedure panicked: {0}")]
    Panicked(String),

    #[error("procedure was cancelled")]
    Cancelled,
}

/// Errors that reach the client as a fault
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown procedure '{address}' with args {arguments:?}")]
    UnknownProcedure {
        address: String,
        arguments: Vec<String>,
    },

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

/// What happened to one inbound packet
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Reply sent to the sender
    Replied(Response),
    /// Body could not be decoded; nothing was sent
    Dropped(DecodeError),
    /// Reply built but could not be sent, not even as a fault
    Unsent(Response),
}

impl DispatchOutcome {
    /// The reply built for the packet, if any
    pub fn response(&self) -> Option<&Response> {
        match self {
            DispatchOutcome::Replied(response) | DispatchOutcome::Unsent(response) => Some(response),
            DispatchOutcome::Dropped(_) => None,
        }
    }
}

/// Resolves requests against a registry and replies through a transport
pub struct Dispatcher {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Handle one inbound packet end to end
    pub async fn dispatch(&self, inbound: Inbound) -> DispatchOutcome {
        let Inbound { datagram, sender } = inbound;

        let request = match decode_request(&datagram.address, &datagram.payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    "Dropping request on {} from {}: {}",
                    datagram.address,
                    sender,
                    e
                );
                return DispatchOutcome::Dropped(e);
            }
        };

        tracing::debug!("Received {:?} from {}", request, sender);

        let response = self.handle(request).await;
        self.reply(sender, response).await
    }

    /// Build the reply for a decoded request
    pub async fn handle(&self, request: Request) -> Response {
        if request.address == INTROSPECTION_ADDRESS {
            let signatures = self.registry.list_signatures().await;
            return Response::success(request.uuid, Value::from(signatures));
        }

        match self.call(&request).await {
            Ok(value) => Response::success(request.uuid, value),
            Err(e) => {
                match &e {
                    DispatchError::UnknownProcedure { .. } => tracing::warn!("{}", e),
                    DispatchError::Invocation(_) => tracing::info!(
                        "Failed to call '{}' with args {:?} - {}",
                        request.address,
                        request.arguments,
                        e
                    ),
                }
                Response::fault(request.uuid, e.to_string())
            }
        }
    }

    async fn call(&self, request: &Request) -> Result<Value, DispatchError> {
        let procedure = match procedure_name(&request.address) {
            Some(name) => self.registry.resolve(name).await,
            None => None,
        };

        let procedure = procedure.ok_or_else(|| DispatchError::UnknownProcedure {
            address: request.address.clone(),
            arguments: request.arguments.clone(),
        })?;

        tracing::info!("Call '{}' with args {:?}", request.address, request.arguments);
        Ok(invoke(&procedure, request.arguments.clone()).await?)
    }

    async fn reply(&self, destination: SocketAddr, response: Response) -> DispatchOutcome {
        let reason = match self.send_reply(destination, &response).await {
            Ok(()) => return DispatchOutcome::Replied(response),
            Err(e) if !e.is_about_content() => {
                tracing::warn!("Failed to send reply {} to {}: {}", response.uuid, destination, e);
                return DispatchOutcome::Unsent(response);
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!("Replacing reply {} to {}: {}", response.uuid, destination, reason);
        let fault = Response::fault(response.uuid, reason);
        match self.send_reply(destination, &fault).await {
            Ok(()) => DispatchOutcome::Replied(fault),
            Err(e) => {
                tracing::warn!("Failed to send fault {} to {}: {}", fault.uuid, destination, e);
                DispatchOutcome::Unsent(fault)
            }
        }
    }

    async fn send_reply(
        &self,
        destination: SocketAddr,
        response: &Response,
    ) -> Result<(), ReplyError> {
        let payload = encode_response(response)?;
        let datagram = Datagram::new(REPLY_ADDRESS, payload);
        Ok(self.transport.send(destination, &datagram).await?)
    }
}

/// Reasons a built reply did not leave the socket
#[derive(Error, Debug)]
enum ReplyError {
    #[error("reply could not be encoded: {0}")]
    Encode(#[from] EncodeError),

    #[error("reply too large: {0} bytes (max {1})")]
    TooLarge(usize, usize),

    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ReplyError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::PayloadTooLarge(size, max) => ReplyError::TooLarge(size, max),
            other => ReplyError::Transport(other),
        }
    }
}

impl ReplyError {
    /// Failures a short fault reply can still get past
    fn is_about_content(&self) -> bool {
        matches!(self, ReplyError::Encode(_) | ReplyError::TooLarge(..))
    }
}

/// Run a procedure on the blocking pool, capturing errors and panics
pub async fn invoke(procedure: &Procedure, arguments: Vec<String>) -> Result<Value, InvocationError> {
    let handler = procedure.handler();

    match tokio::task::spawn_blocking(move || (*handler)(Args::new(&arguments))).await {
        Ok(result) => Ok(result?),
        Err(e) if e.is_panic() => Err(InvocationError::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(InvocationError::Cancelled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
