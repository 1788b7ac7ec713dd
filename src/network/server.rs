//! RPC Server
//!
//! Owns the receive loop: pulls packets from the transport and hands each to
//! the dispatcher, inline or on its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use super::dispatch::Dispatcher;
use super::{ServeMode, ServerConfig};
use crate::registry::Registry;
use crate::transport::{Transport, TransportError, UdpTransport};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// RPC Server
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Procedures served
    registry: Arc<Registry>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Receive loop task
    task: Option<JoinHandle<()>>,
    /// Bound address while running
    local_addr: Option<SocketAddr>,
    /// Whether the receive loop is running
    running: Arc<RwLock<bool>>,
}

impl Server {
    /// Create a new server
    pub fn new(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            shutdown_tx: None,
            task: None,
            local_addr: None,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Procedures served; may be changed while running
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind a UDP socket from the configuration and start serving
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        self.ensure_stopped().await?;

        let bind_addr = self.config.socket_addr().map_err(|e| {
            ServerError::BindFailed(format!("Invalid bind address {}: {}", self.config.bind_address, e))
        })?;
        let transport = UdpTransport::bind(bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        self.start_with(Arc::new(transport)).await
    }

    /// Start serving on an already bound transport
    pub async fn start_with(&mut self, transport: Arc<dyn Transport>) -> ServerResult<SocketAddr> {
        self.ensure_stopped().await?;

        let local_addr = transport.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        let dispatcher = Arc::new(Dispatcher::new(self.registry.clone(), transport));
        let task = tokio::spawn(serve(
            dispatcher,
            self.config.mode,
            shutdown_rx,
            self.running.clone(),
        ));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        self.local_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// Stop the server and wait for the transport to be released
    ///
    /// In-flight dispatches are abandoned, in either mode; their replies are
    /// never sent.
    pub async fn stop(&mut self) -> ServerResult<()> {
        let task = self.task.take().ok_or(ServerError::NotRunning)?;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Err(e) = task.await {
            tracing::error!("Receive loop ended abnormally: {}", e);
        }

        self.local_addr = None;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Check if the server is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Address the server is bound to, while started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn ensure_stopped(&mut self) -> ServerResult<()> {
        if self.is_running().await {
            return Err(ServerError::AlreadyRunning);
        }

        // loop ended on its own after a transport failure
        if let Some(task) = self.task.take() {
            let _ = task.await;
            self.shutdown_tx = None;
            self.local_addr = None;
        }

        Ok(())
    }
}

/// Receive loop
async fn serve(
    dispatcher: Arc<Dispatcher>,
    mode: ServeMode,
    mut shutdown_rx: mpsc::Receiver<()>,
    running: Arc<RwLock<bool>>,
) {
    let transport = dispatcher.transport().clone();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            result = transport.recv() => {
                match result {
                    Ok(inbound) => match mode {
                        ServeMode::Inline => {
                            tokio::select! {
                                _ = dispatcher.dispatch(inbound) => {}
                                _ = shutdown_rx.recv() => {
                                    tracing::info!("Server shutdown requested during dispatch");
                                    break;
                                }
                            }
                        }
                        ServeMode::TaskPerPacket => {
                            let dispatcher = dispatcher.clone();
                            in_flight.spawn(async move {
                                dispatcher.dispatch(inbound).await;
                            });
                        }
                    },
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!("Dropping datagram: {}", e);
                    }
                    Err(e) => {
                        tracing::error!("Receive failed, stopping server: {}", e);
                        break;
                    }
                }
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    tracing::error!("Dispatch task failed: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Server shutdown requested");
                break;
            }
        }
    }

    // drops every dispatcher clone so the socket closes with the loop
    in_flight.shutdown().await;

    let mut running = running.write().await;
    *running = false;
}
